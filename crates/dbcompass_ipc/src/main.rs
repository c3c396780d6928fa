use dbcompass_ipc::{CoreHandler, RequestEnvelope, ResponseEnvelope, default_registry};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Serves the core over stdio: one JSON request envelope per line in, one
/// JSON response envelope per line out. The UI process owns the other end
/// of the pipe.
#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let registry = match default_registry() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error: failed to initialize profile storage: {e}");
            std::process::exit(1);
        }
    };
    let handler = CoreHandler::new(registry);

    log::info!("dbcompass core started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RequestEnvelope>(&line) {
            Ok(envelope) => handler.handle_envelope(envelope).await,
            Err(e) => ResponseEnvelope::error(0, format!("Invalid request: {e}")),
        };

        let mut payload = serde_json::to_string(&response)
            .unwrap_or_else(|e| format!(r#"{{"request_id":0,"body":{{"kind":"error","payload":{{"message":"{e}"}}}}}}"#));
        payload.push('\n');
        stdout.write_all(payload.as_bytes()).await?;
        stdout.flush().await?;
    }

    handler.registry().close_all().await;
    log::info!("dbcompass core shutting down");
    Ok(())
}
