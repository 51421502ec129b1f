use std::io::Read;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::Decoder;

/// Streaming telemetry client.
///
/// The client owns a TCP connection to a unit bridge and a dedicated
/// receive thread. Every valid frame is handed to the registered
/// callback as `(channel_index, payload)`; the link is receive only
/// and invalid frames are dropped by the decoder without notice.
///
/// The callback runs on the receive thread and must not block for
/// long, or the kernel socket buffer will back up.
pub struct Client {
    stream: TcpStream,
    alive: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Client {
    /// Connect and start the receive thread.
    pub fn connect<A, F>(address: A, callback: F) -> std::io::Result<Self>
    where
        A: ToSocketAddrs,
        F: Fn(u8, &[u8]) + Send + 'static,
    {
        let stream = TcpStream::connect(address)?;
        let alive = Arc::new(AtomicBool::new(true));

        let reader = stream.try_clone()?;
        let thread_alive = alive.clone();

        let handle = std::thread::Builder::new()
            .name("uplink".to_owned())
            .spawn(move || Self::recv_loop(reader, thread_alive, callback))?;

        Ok(Self {
            stream,
            alive,
            handle: Some(handle),
        })
    }

    fn recv_loop<F>(stream: TcpStream, alive: Arc<AtomicBool>, callback: F)
    where
        F: Fn(u8, &[u8]),
    {
        let mut reader = std::io::BufReader::new(stream);
        let mut decoder = Decoder::new();
        let mut byte = [0u8; 1];

        while alive.load(Ordering::Acquire) {
            match reader.read(&mut byte) {
                Ok(0) => {
                    debug!("Uplink peer closed the connection");
                    break;
                }
                Ok(_) => {
                    if let Some(frame) = decoder.advance(byte[0]) {
                        callback(frame.channel, &frame.payload);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Shutdown from `stop` surfaces here as well.
                    if alive.load(Ordering::Acquire) {
                        warn!("Uplink receive error: {}", e);
                    }
                    break;
                }
            }
        }

        alive.store(false, Ordering::Release);

        debug!(
            "Uplink receive loop done: {} frames, {} dropped, {} bytes skipped",
            decoder.stats.rx_count, decoder.stats.rx_failure, decoder.stats.sync_skipped
        );
    }

    /// Whether the receive thread is still serving frames.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Close the connection and join the receive thread.
    ///
    /// Calling `stop` more than once is a no-op.
    pub fn stop(&mut self) {
        if self.alive.swap(false, Ordering::AcqRel) {
            let _ = self.stream.shutdown(Shutdown::Both);
        }

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Frame;

    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::mpsc;

    #[test]
    fn receive_and_stop() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            peer.write_all(&Frame::new(3, vec![1, 2, 3, 4]).to_bytes())
                .unwrap();
            peer.write_all(&Frame::new(4, vec![9, 9]).to_bytes()).unwrap();
            peer.flush().unwrap();
            peer
        });

        let (tx, rx) = mpsc::channel();
        let mut client = Client::connect(address, move |channel, payload| {
            tx.send((channel, payload.to_vec())).unwrap();
        })
        .unwrap();

        let timeout = std::time::Duration::from_secs(5);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), (3, vec![1, 2, 3, 4]));
        assert_eq!(rx.recv_timeout(timeout).unwrap(), (4, vec![9, 9]));

        let _peer = server.join().unwrap();

        client.stop();
        assert!(!client.is_alive());

        // Idempotent.
        client.stop();
    }
}
