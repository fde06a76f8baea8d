//! Virtual SiK modem task
//!
//! Runs a shared [`VirtualSikModem`] on one end of an async byte stream,
//! typically a `tokio::io::duplex` pair whose other end is handed to the
//! code under test. The task ends when the peer closes the stream.

use std::io;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::VirtualSikModem;

/// Serve `modem` over `stream` as if the host had opened it at `baud`
///
/// At any baud other than the modem's own serial speed the modem swallows
/// everything and answers nothing, like a real port at the wrong rate.
pub async fn run_virtual_sik_task<S>(mut stream: S, modem: Arc<Mutex<VirtualSikModem>>, baud: u32) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 256];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            debug!("Virtual SiK modem stream closed");
            return Ok(());
        }

        let output = match modem.lock() {
            Ok(mut modem) if modem.serial_speed() == baud => modem.process_bytes(&buf[..n]),
            Ok(_) => Vec::new(),
            Err(_) => {
                warn!("Virtual SiK modem state poisoned");
                return Err(io::Error::other("modem state poisoned"));
            }
        };
        if !output.is_empty() {
            stream.write_all(&output).await?;
            stream.flush().await?;
        }
    }
}
