#![allow(dead_code)]

use sqs_verify::{ClientConfig, Harness, HarnessConfig, MessageQueue, SqsQueue};
use testcontainers::ContainerAsync;
use testcontainers_modules::{
    localstack::LocalStack,
    testcontainers::{runners::AsyncRunner, ImageExt, TestcontainersError},
};
use tokio::sync::{Mutex, OnceCell};

// Shared LocalStack container across all tests in a binary.
// Only started when no endpoint is configured through the environment.
static SHARED_CONTAINER: OnceCell<Mutex<(String, ContainerAsync<LocalStack>)>> =
    OnceCell::const_new();

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub async fn localstack() -> Result<(String, ContainerAsync<LocalStack>), TestcontainersError> {
    let request = LocalStack::default()
        .with_tag("latest")
        .with_env_var("SERVICES", "sqs")
        .with_env_var("SKIP_SSL_CERT_DOWNLOAD", "1");
    let container = request.start().await?;

    let host_ip = container.get_host().await?;
    let host_port = container.get_host_port_ipv4(4566).await?;
    let endpoint_url = format!("http://{host_ip}:{host_port}");

    Ok((endpoint_url, container))
}

/// Endpoint from `SQS_ENDPOINT_URL` (or `.env`) when set, otherwise a
/// LocalStack container started on first use.
pub async fn client_config() -> ClientConfig {
    dotenvy::dotenv().ok();

    let from_env = ClientConfig::from_env();
    if from_env.endpoint_url.is_some() {
        return from_env;
    }

    let shared = SHARED_CONTAINER
        .get_or_init(|| async {
            let (endpoint_url, container) = localstack()
                .await
                .expect("failed to start LocalStack container");
            Mutex::new((endpoint_url, container))
        })
        .await;

    let endpoint_url = shared.lock().await.0.clone();
    ClientConfig::local(endpoint_url)
}

pub async fn sqs_queue() -> SqsQueue {
    init_logging();
    SqsQueue::connect(&client_config().await).await
}

/// Generate a unique queue name for testing, using a UUID suffix.
pub fn unique_queue_name(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

pub fn harness_config() -> HarnessConfig {
    HarnessConfig {
        wait_time_seconds: 1,
        ..HarnessConfig::default()
    }
}

/// A harness bound to a fresh, uniquely named queue.
pub async fn setup(prefix: &str) -> Harness<SqsQueue> {
    let queue = sqs_queue().await;
    Harness::create(queue, &unique_queue_name(prefix), harness_config())
        .await
        .expect("failed to create test queue")
}

pub async fn teardown(harness: Harness<SqsQueue>) {
    if let Err(e) = harness.queue().delete_queue(harness.queue_ref()).await {
        eprintln!("Warning: failed to delete test queue: {e}");
    }
}
