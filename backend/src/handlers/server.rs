pub async fn server_version() -> String {
    format!("v{}", env!("CARGO_PKG_VERSION"))
}
