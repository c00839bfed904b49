//! In-memory device for tests.

use nesigner_protocol::{Decoder, RequestFrame, ResponseFrame, WireFrame};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

/// Spawns a device on one end of an in-memory pipe and returns the host end.
///
/// `handler` sees every decoded request in arrival order and returns the
/// responses to write back, if any. The task yields every request it saw
/// once the host closes its side.
pub(crate) fn spawn_device<H>(mut handler: H) -> (DuplexStream, JoinHandle<Vec<RequestFrame>>)
where
    H: FnMut(RequestFrame) -> Vec<ResponseFrame> + Send + 'static,
{
    let (host, device) = tokio::io::duplex(256 * 1024);

    let task = tokio::spawn(async move {
        let (mut reader, mut writer) = tokio::io::split(device);
        let mut decoder: Decoder<RequestFrame> = Decoder::new();
        let mut buf = vec![0u8; 4096];
        let mut seen = Vec::new();

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            decoder.extend(&buf[..n]);

            // A corrupt request means two writes were interleaved.
            while let Some(frame) = decoder.decode_frame().expect("host sent a corrupt frame") {
                seen.push(frame.clone());
                for response in handler(frame) {
                    let encoded = response.encode().expect("response too large");
                    if writer.write_all(&encoded).await.is_err() {
                        return seen;
                    }
                }
            }
        }
        seen
    });

    (host, task)
}

/// Reads exactly one request frame from the device end.
pub(crate) async fn read_request(device: &mut DuplexStream) -> RequestFrame {
    let mut decoder: Decoder<RequestFrame> = Decoder::new();
    let mut byte = [0u8; 1];
    loop {
        device.read_exact(&mut byte).await.expect("host closed");
        decoder.extend(&byte);
        if let Some(frame) = decoder.decode_frame().expect("host sent a corrupt frame") {
            return frame;
        }
    }
}
