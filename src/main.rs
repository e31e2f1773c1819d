#[tokio::main]
async fn main() {
    if let Err(err) = kubequery_lib::run_service().await {
        eprintln!("[kubequery] service failed: {err:?}");
        std::process::exit(1);
    }
}
