//! Integration tests for the native backend through the public session API.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use strata_training::{
    ClusterAlgorithm, ClusterRequest, Column, Frame, NativeBackend, NullProgressSink, OutlierRequest, ProblemType,
    SearchBudget, SupervisedRequest, TargetValue, TrainingBackend, TrainingError,
};
use tempfile::TempDir;

fn churn_frame(n: usize, seed: u64) -> Frame {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tenure = Vec::with_capacity(n);
    let mut plan = Vec::with_capacity(n);
    let mut churned = Vec::with_capacity(n);
    for _ in 0..n {
        let months: f64 = rng.gen_range(0.0..60.0);
        let premium = rng.gen_bool(0.5);
        tenure.push(Some(months));
        plan.push(Some(if premium { "premium" } else { "basic" }.to_string()));
        churned.push(Some(if months < 20.0 { "yes" } else { "no" }.to_string()));
    }
    Frame::new(vec![
        Column::numeric("tenure", tenure),
        Column::text("plan", plan),
        Column::text("churned", churned),
    ])
    .unwrap()
}

#[tokio::test]
async fn test_supervised_model_reloads_from_disk() {
    let temp = TempDir::new().unwrap();
    let backend = NativeBackend::new();
    backend.check_available().unwrap();
    let session = backend.open_session(&temp.path().join("job")).unwrap();

    let frame = churn_frame(120, 5);
    let fit = session
        .fit_supervised(
            SupervisedRequest {
                frame: frame.clone(),
                target: "churned".to_string(),
                problem_type: ProblemType::Binary,
                eval_metric: "roc_auc".to_string(),
                budget: SearchBudget { time_limit: Duration::from_secs(30), max_models: Some(4) },
                excluded_columns: vec![],
                seed: 42,
            },
            Arc::new(NullProgressSink),
        )
        .await
        .unwrap();

    assert!(fit.model_path.starts_with(session.workdir()));
    assert_eq!(fit.features, vec!["tenure".to_string(), "plan".to_string()]);

    let reloaded = backend.load_predictor(&fit.model_path).unwrap();
    assert_eq!(reloaded.model_name(), fit.best_model);
    assert_eq!(reloaded.class_labels().unwrap(), ["no".to_string(), "yes".to_string()]);
    assert_eq!(reloaded.predict(&frame).unwrap(), fit.predictor.predict(&frame).unwrap());

    let proba = reloaded.predict_proba(&frame).unwrap().unwrap();
    assert!(proba.iter().all(|p| (p.iter().sum::<f64>() - 1.0).abs() < 1e-6));
    let hits = reloaded
        .predict(&frame)
        .unwrap()
        .iter()
        .enumerate()
        .filter(|(i, p)| {
            let actual = frame.column("churned").unwrap().value_key(*i).unwrap();
            **p == TargetValue::Label(actual)
        })
        .count();
    assert!(hits as f64 / 120.0 > 0.85);
}

#[tokio::test]
async fn test_cluster_model_is_not_a_predictor() {
    let temp = TempDir::new().unwrap();
    let backend = NativeBackend::new();
    let session = backend.open_session(temp.path()).unwrap();

    let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![f64::from(i % 3) * 10.0, f64::from(i % 2)]).collect();
    let fit = session
        .fit_clusters(ClusterRequest { rows, n_clusters: 3, algorithm: ClusterAlgorithm::KMeans, seed: 9 })
        .await
        .unwrap();
    assert_eq!(fit.labels.len(), 30);

    assert!(matches!(backend.load_predictor(&fit.model_path), Err(TrainingError::Artifact(_))));
}

#[tokio::test]
async fn test_outlier_session_scores_every_row() {
    let temp = TempDir::new().unwrap();
    let session = NativeBackend::new().open_session(temp.path()).unwrap();
    let rows: Vec<Vec<f64>> = (0..50).map(|i| vec![f64::from(i % 5), 1.0]).collect();
    let fit = session.fit_outliers(OutlierRequest { rows, contamination: 0.1, seed: 3 }).await.unwrap();
    assert_eq!(fit.scores.len(), 50);
    assert_eq!(fit.model, "IsolationForest");
}

#[tokio::test]
async fn test_missing_model_file_is_artifact_error() {
    let temp = TempDir::new().unwrap();
    let err = NativeBackend::new().load_predictor(&temp.path().join("model.json"));
    assert!(matches!(err, Err(TrainingError::Artifact(_))));
}
