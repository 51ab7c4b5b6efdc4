//! Line-delimited JSON protocol over stdin/stdout.
//!
//! Each input line is one request [`Message`]; each reply is written as one
//! line. Requests are handled in arrival order.

use chunkyard_protocol::{Message, error_code};
use chunkyard_transfer::{AsyncTransferCoordinator, TransferCoordinator, TransferHandler};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

pub async fn run(coordinator: TransferCoordinator) -> anyhow::Result<()> {
    let handler = TransferHandler::new(AsyncTransferCoordinator::new(coordinator));
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve(&handler, stdin, stdout).await
}

async fn serve<R, W>(handler: &TransferHandler, reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut served = 0u64;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Message>(&line) {
            Ok(msg) => handler.handle(msg).await,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request");
                Message::error("", error_code::BAD_REQUEST, format!("invalid message: {e}"))
            }
        };

        let mut out = serde_json::to_vec(&reply)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
        served += 1;
    }

    tracing::info!(served, "input closed");
    Ok(())
}
