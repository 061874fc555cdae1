//! CLI command implementations

use std::num::NonZeroU64;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use fyvio_core::config::FyvioConfig;
use fyvio_core::{AccessToken, BackendConnection, ConnectionPool, FyvioError};
use fyvio_sim::{LocalLibrary, LocalLibraryConnection};
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Serve a local media directory through the streaming gateway
    Server {
        /// Host to bind to (overrides FYVIO_HOST)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to (overrides FYVIO_PORT)
        #[arg(short, long)]
        port: Option<u16>,
        /// Public base URL used when printing stream links
        #[arg(long)]
        base_url: Option<String>,
        /// Directory whose files are published as a channel
        #[arg(long)]
        media_dir: PathBuf,
        /// Number of simulated backend connections
        #[arg(short, long, default_value = "1")]
        connections: usize,
        /// Channel id embedded in generated tokens
        #[arg(long, default_value = "1")]
        channel_id: i64,
        /// Backend read size in bytes
        #[arg(long)]
        chunk_size: Option<NonZeroU64>,
        /// Log which connection serves each client
        #[arg(long)]
        multi_client: bool,
    },
    /// Encode or decode access tokens
    #[command(subcommand)]
    Token(TokenCommand),
}

/// Token inspection commands
#[derive(Subcommand)]
pub enum TokenCommand {
    /// Build a token from its parts
    Encode {
        /// Short channel id
        #[arg(long, allow_negative_numbers = true)]
        chat_id: i64,
        /// Message carrying the media
        #[arg(long)]
        message_id: i64,
        /// First six characters of the file's unique id
        #[arg(long)]
        hash: String,
    },
    /// Show what a token refers to
    Decode {
        /// Token as it appears in a stream link
        token: String,
    },
}

/// Handle the CLI command
///
/// `config` carries environment settings; `server` flags override them.
///
/// # Errors
/// Returns the first failure of the selected command.
pub async fn handle_command(command: Commands, mut config: FyvioConfig) -> anyhow::Result<()> {
    match command {
        Commands::Server {
            host,
            port,
            base_url,
            media_dir,
            connections,
            channel_id,
            chunk_size,
            multi_client,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(base_url) = base_url {
                config.server.base_url = base_url.trim_end_matches('/').to_string();
            }
            if let Some(chunk_size) = chunk_size {
                config.streaming.chunk_size = chunk_size;
            }
            config.streaming.multi_client |= multi_client;

            start_server(config, media_dir, connections, channel_id).await
        }
        Commands::Token(TokenCommand::Encode {
            chat_id,
            message_id,
            hash,
        }) => Ok(encode_token(chat_id, message_id, hash)?),
        Commands::Token(TokenCommand::Decode { token }) => Ok(decode_token(&token)?),
    }
}

/// Publish a directory over `connections` simulated backend sessions
///
/// # Errors
/// - Configuration fails validation
/// - Media directory cannot be scanned
/// - Listener cannot bind
pub async fn start_server(
    config: FyvioConfig,
    media_dir: PathBuf,
    connections: usize,
    channel_id: i64,
) -> anyhow::Result<()> {
    config.validate().map_err(FyvioError::from)?;
    anyhow::ensure!(connections > 0, "at least one connection is required");

    let library = LocalLibrary::scan(&media_dir, channel_id)
        .await
        .with_context(|| format!("cannot publish {}", media_dir.display()))?;
    let library = Arc::new(library);

    info!(
        "Publishing {} file(s) from {} as channel {}",
        library.len(),
        media_dir.display(),
        channel_id
    );
    for entry in library.entries() {
        let token = AccessToken::for_file(
            library.channel_id(),
            entry.properties.message_id,
            &entry.properties.unique_id,
        );
        let name = entry.properties.file_name.as_deref().unwrap_or("file");
        info!(
            "{} -> {}",
            entry.relative_path,
            config.server.stream_url(&token.encode(), name)
        );
    }

    let backends: Vec<Arc<dyn BackendConnection>> = (0..connections)
        .map(|n| {
            Arc::new(LocalLibraryConnection::new(
                format!("local-{n}"),
                Arc::clone(&library),
            )) as Arc<dyn BackendConnection>
        })
        .collect();
    let pool = Arc::new(ConnectionPool::new(backends));

    fyvio_web::run_server(config, pool)
        .await
        .map_err(FyvioError::from)
        .context("server terminated")?;
    Ok(())
}

/// Print the token for the given parts
///
/// # Errors
/// - `FyvioError::Decode` - Parts do not form a token the gateway would accept
pub fn encode_token(chat_id: i64, message_id: i64, hash: String) -> fyvio_core::Result<()> {
    let token = AccessToken::new(chat_id, message_id, hash).encode();
    // Reject parts the gateway would refuse at request time
    AccessToken::decode(&token)?;
    println!("{token}");
    Ok(())
}

/// Print the fields of a token
///
/// # Errors
/// - `FyvioError::Decode` - Token cannot be decoded
pub fn decode_token(token: &str) -> fyvio_core::Result<()> {
    let decoded = AccessToken::decode(token)?;
    println!("chat_id:         {}", decoded.chat_id);
    if let Some(backend_id) = decoded.backend_chat_id() {
        println!("backend chat id: {backend_id}");
    }
    println!("message_id:      {}", decoded.message_id);
    println!("hash:            {}", decoded.hash);
    Ok(())
}
