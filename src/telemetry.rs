use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{sleep, timeout, Duration};

use crate::config::TelemetryConfig;
use crate::control::CancelToken;
use crate::error::{LinkError, LinkResult};
use crate::framing::{FrameStats, TelemetryParser};
use crate::presenter::{CloseReason, LinkEvent};
use crate::types::StateUpdate;

const READ_CHUNK: usize = 256;

/// Connect, stream records to the presenter until the peer goes away or the
/// token is cancelled, then report the closure.
///
/// A failed connect is reported once and nothing else happens. Cancelling
/// while the connect is pending ends the session without any event.
pub async fn telemetry_session(
    cfg: TelemetryConfig,
    cancel: CancelToken,
    tx: UnboundedSender<LinkEvent>,
) {
    let addr = cfg.address();
    let attempt = connect(&addr, cfg.connect_timeout_ms);
    tokio::pin!(attempt);
    let result = loop {
        tokio::select! {
            result = &mut attempt => break result,
            _ = sleep(Duration::from_millis(cfg.read_timeout_ms)) => {
                if cancel.is_cancelled() {
                    log::info!("Connect to {} abandoned", addr);
                    return;
                }
            }
        }
    };
    let stream = match result {
        Ok(stream) => stream,
        Err(e) => {
            log::error!("{}", e);
            let _ = tx.send(LinkEvent::ConnectFailed(e));
            return;
        }
    };

    let peer = stream.peer_addr().ok();
    log::info!("Connected to drone at {}", addr);
    if tx.send(LinkEvent::Connected(peer)).is_err() {
        return;
    }

    let (reason, stats) = read_loop(stream, &cfg, &cancel, &tx).await;
    log::info!(
        "Drone connection closed ({}): {} records, {} dropped lines",
        reason,
        stats.records,
        stats.dropped_lines
    );
    let _ = tx.send(LinkEvent::ConnectionClosed { reason, stats });
}

async fn connect(addr: &str, timeout_ms: u64) -> LinkResult<TcpStream> {
    match timeout(Duration::from_millis(timeout_ms), TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(LinkError::Connect {
            addr: addr.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(LinkError::ConnectTimeout {
            addr: addr.to_string(),
            timeout_ms,
        }),
    }
}

/// Owns the stream; it is shut down and dropped exactly once on return.
async fn read_loop(
    mut stream: TcpStream,
    cfg: &TelemetryConfig,
    cancel: &CancelToken,
    tx: &UnboundedSender<LinkEvent>,
) -> (CloseReason, FrameStats) {
    let mut parser = TelemetryParser::new(cfg.frame_capacity);
    let mut chunk = [0u8; READ_CHUNK];
    let read_timeout = Duration::from_millis(cfg.read_timeout_ms);

    let reason = loop {
        if cancel.is_cancelled() {
            break CloseReason::Disconnected;
        }

        let n = match timeout(read_timeout, stream.read(&mut chunk)).await {
            // Nothing arrived; go round and look at the cancel flag
            Err(_) => continue,
            Ok(Ok(0)) => break CloseReason::EndOfStream,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                let err = LinkError::Stream(e.to_string());
                log::warn!("{}", err);
                break CloseReason::ReadFailed(err);
            }
        };

        let mut delivered = true;
        parser.feed(&chunk[..n], |record| {
            if tx.send(LinkEvent::State(StateUpdate::from_record(&record))).is_err() {
                delivered = false;
            }
        });
        if !delivered {
            break CloseReason::Disconnected;
        }
    };

    if let Err(e) = stream.shutdown().await {
        log::debug!("Socket shutdown: {}", e);
    }
    (reason, parser.stats())
}
