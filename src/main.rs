//! localchat binary
//!
//! Interactive offline chat over the local model manager. Stands in for an
//! HTTP/WS surface: every command maps onto one call of the core's public
//! API, and responses are streamed chunk by chunk.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use localchat::app::AppContext;
use localchat::types::config::{default_config_path, AppConfig};
use localchat::types::generation::GenerationRequest;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load(&default_config_path());
    tracing::info!("models directory: {}", config.models_dir.display());

    #[cfg(feature = "llama")]
    let context = AppContext::with_llama(config);
    #[cfg(not(feature = "llama"))]
    let context = AppContext::new(config);

    if let Err(e) = context.manager.initialize().await {
        tracing::error!("startup scan failed: {}", e);
        std::process::exit(1);
    }

    print_status(&context);
    println!("Commands: :models  :load <name>  :unload  :quit  (anything else chats)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input.split_once(' ').unwrap_or((input, "")) {
            (":quit", _) | (":q", _) => break,
            (":models", _) => match context.manager.list_available() {
                Ok(models) => {
                    for model in models {
                        println!(
                            "  {}  {:.2} GB  {}",
                            model.filename,
                            model.size_gb(),
                            model.description()
                        );
                    }
                }
                Err(e) => println!("scan failed: {e}"),
            },
            (":load", name) => {
                if context.manager.load_model(name.trim()).await {
                    print_status(&context);
                } else {
                    println!("failed to load {name}");
                }
            }
            (":unload", _) => {
                context.manager.unload().await;
                println!("unloaded");
            }
            _ => {
                let mut request = GenerationRequest::new(input);
                request.max_tokens = context.config.max_tokens;
                request.temperature = context.config.temperature;

                let mut rx = context.manager.generate_stream(&request).await;
                while let Some(chunk) = rx.recv().await {
                    print!("{chunk}");
                    let _ = std::io::stdout().flush();
                }
                println!();
            }
        }
    }
}

fn print_status(context: &AppContext) {
    match context.manager.current_model() {
        Some(loaded) => println!(
            "model: {} ({:?} backend, ctx {})",
            loaded.descriptor.filename, loaded.backend, loaded.context_size
        ),
        None => println!("no model loaded"),
    }
}
