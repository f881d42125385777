//! # Link Providers
//!
//! The unreliable datagram link underneath the transport queue. A [`Link`]
//! sends one payload per call, fire-and-forget. A [`LinkReceiver`] delivers
//! incoming payloads to a registered handler from its own task, so the
//! handler may run concurrently with the consumer draining the queue.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::address::MacAddress;

/// Receive buffer of the UDP link; larger than a packet so oversized
/// datagrams reach the handler and get truncated there
const RECV_BUFFER_SIZE: usize = 2048;

/// Pause after a failed receive before polling the socket again
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Callback invoked by a link for every received payload
pub type ReceiveHandler = Box<dyn Fn(MacAddress, &[u8]) + Send + Sync + 'static>;

/// Sending half of a link
#[cfg_attr(test, mockall::automock)]
pub trait Link: Send + Sync {
    /// Send one payload to `dest` without waiting for delivery
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot accept the payload right now.
    fn send(&self, dest: &MacAddress, payload: &[u8]) -> io::Result<()>;
}

/// Receiving half of a link
pub trait LinkReceiver {
    /// Register the handler for incoming payloads, replacing any previous one
    fn on_receive(&mut self, handler: ReceiveHandler);
}

/// UDP datagram link
///
/// [`MacAddress::BROADCAST`] is sent to the IPv4 limited broadcast address
/// on the link's own port, so peers bound to the same port all hear it.
pub struct UdpLink {
    socket: Arc<UdpSocket>,
    port: u16,
    receive_task: Option<JoinHandle<()>>,
}

impl UdpLink {
    /// Bind a broadcast-capable UDP socket
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound or configured.
    pub async fn bind(addr: SocketAddrV4) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        socket.set_broadcast(true)?;
        let port = socket.local_addr()?.port();

        info!("UDP link bound to {}", socket.local_addr()?);
        Ok(Self {
            socket: Arc::new(socket),
            port,
            receive_task: None,
        })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddrV4> {
        match self.socket.local_addr()? {
            SocketAddr::V4(addr) => Ok(addr),
            SocketAddr::V6(addr) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("IPv6 link address {} not supported", addr),
            )),
        }
    }

    fn target(&self, dest: &MacAddress) -> SocketAddrV4 {
        if dest.is_broadcast() {
            SocketAddrV4::new(Ipv4Addr::BROADCAST, self.port)
        } else {
            SocketAddrV4::from(*dest)
        }
    }
}

impl Link for UdpLink {
    fn send(&self, dest: &MacAddress, payload: &[u8]) -> io::Result<()> {
        let target = self.target(dest);
        let sent = self.socket.try_send_to(payload, SocketAddr::V4(target))?;
        if sent != payload.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("sent {} of {} bytes to {}", sent, payload.len(), target),
            ));
        }
        debug!("Sent {} bytes to {}", sent, target);
        Ok(())
    }
}

impl LinkReceiver for UdpLink {
    /// Spawns the receive loop on the current Tokio runtime
    fn on_receive(&mut self, handler: ReceiveHandler) {
        if let Some(task) = self.receive_task.take() {
            task.abort();
        }

        let socket = Arc::clone(&self.socket);
        self.receive_task = Some(tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_SIZE];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, SocketAddr::V4(from))) => handler(MacAddress::from(from), &buf[..len]),
                    Ok((len, from)) => debug!("Ignoring {} bytes from {}", len, from),
                    Err(e) => {
                        warn!("Link receive error: {}", e);
                        tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                    }
                }
            }
        }));
    }
}

impl Drop for UdpLink {
    fn drop(&mut self) {
        if let Some(task) = self.receive_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn loopback() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)
    }

    #[tokio::test]
    async fn test_udp_send_and_receive() {
        let sender = UdpLink::bind(loopback()).await.unwrap();
        let mut receiver = UdpLink::bind(loopback()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        receiver.on_receive(Box::new(move |from, data| {
            let _ = tx.send((from, data.to_vec()));
        }));

        let dest = MacAddress::from(receiver.local_addr().unwrap());
        sender.send(&dest, &[1, 2, 3, 4]).unwrap();

        let (from, data) = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data, vec![1, 2, 3, 4]);
        assert_eq!(from, MacAddress::from(sender.local_addr().unwrap()));
    }

    #[tokio::test]
    async fn test_handler_replaced() {
        let sender = UdpLink::bind(loopback()).await.unwrap();
        let mut receiver = UdpLink::bind(loopback()).await.unwrap();

        let first = Arc::new(Mutex::new(0usize));
        let first_count = Arc::clone(&first);
        receiver.on_receive(Box::new(move |_, _| {
            *first_count.lock().unwrap() += 1;
        }));

        let (tx, mut rx) = mpsc::unbounded_channel();
        receiver.on_receive(Box::new(move |_, data| {
            let _ = tx.send(data.to_vec());
        }));

        let dest = MacAddress::from(receiver.local_addr().unwrap());
        sender.send(&dest, &[9]).unwrap();

        let data = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data, vec![9]);
        assert_eq!(*first.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_targets_own_port() {
        let link = UdpLink::bind(loopback()).await.unwrap();
        let port = link.local_addr().unwrap().port();
        assert_eq!(
            link.target(&MacAddress::BROADCAST),
            SocketAddrV4::new(Ipv4Addr::BROADCAST, port)
        );
    }
}
