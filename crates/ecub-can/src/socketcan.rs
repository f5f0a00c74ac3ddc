//! Raw SocketCAN transport (Linux only)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use socketcan::{CanFrame as LinuxCanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket, StandardId};
use tokio::sync::broadcast;

use crate::{CanBus, CanBusError, CanFrame};

/// CAN bus backed by a raw SocketCAN socket.
///
/// A background listener reads frames off the non-blocking socket and fans
/// them out over a broadcast channel.
pub struct SocketCanBus {
    socket: Arc<Mutex<CanSocket>>,
    running: Arc<AtomicBool>,
    incoming_tx: broadcast::Sender<CanFrame>,
}

impl SocketCanBus {
    pub fn open(interface: &str) -> Result<Self, CanBusError> {
        let socket = CanSocket::open(interface)
            .map_err(|e| CanBusError::Open(format!("{interface}: {e}")))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| CanBusError::Open(format!("set_nonblocking: {e}")))?;

        let (incoming_tx, _) = broadcast::channel(1024);

        let bus = Self {
            socket: Arc::new(Mutex::new(socket)),
            running: Arc::new(AtomicBool::new(true)),
            incoming_tx,
        };
        bus.start_listener();

        tracing::info!(interface, "SocketCAN bus opened");
        Ok(bus)
    }

    fn start_listener(&self) {
        let socket = self.socket.clone();
        let running = self.running.clone();
        let incoming_tx = self.incoming_tx.clone();

        tokio::task::spawn_blocking(move || {
            while running.load(Ordering::SeqCst) {
                let socket_guard = socket.lock();
                match socket_guard.read_frame() {
                    Ok(frame) => {
                        drop(socket_guard);
                        let frame = CanFrame::new(frame.raw_id(), frame.data());
                        tracing::trace!(id = format!("0x{:X}", frame.id), "CAN frame received");
                        if incoming_tx.send(frame).is_err() {
                            // No receivers yet; frames before startup finishes
                            // are not interesting.
                        }
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        drop(socket_guard);
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Err(e) => {
                        drop(socket_guard);
                        tracing::error!(?e, "SocketCAN read error");
                        std::thread::sleep(Duration::from_millis(100));
                    }
                }
            }
            tracing::debug!("SocketCAN listener stopped");
        });
    }
}

#[async_trait]
impl CanBus for SocketCanBus {
    async fn publish(&self, frame: CanFrame) -> Result<(), CanBusError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(CanBusError::Closed);
        }

        let raw = to_linux_frame(&frame)?;
        let socket = self.socket.clone();

        tokio::task::spawn_blocking(move || {
            let socket_guard = socket.lock();
            socket_guard
                .write_frame(&raw)
                .map_err(|e| CanBusError::Send(e.to_string()))
        })
        .await
        .map_err(|e| CanBusError::Send(format!("task join error: {e}")))??;

        Ok(())
    }

    fn frames(&self) -> broadcast::Receiver<CanFrame> {
        self.incoming_tx.subscribe()
    }
}

impl Drop for SocketCanBus {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn to_linux_frame(frame: &CanFrame) -> Result<LinuxCanFrame, CanBusError> {
    let raw = if frame.id <= 0x7FF {
        let id = StandardId::new(frame.id as u16)
            .ok_or_else(|| CanBusError::Send(format!("invalid standard CAN ID 0x{:X}", frame.id)))?;
        LinuxCanFrame::new(id, frame.data())
    } else {
        let id = ExtendedId::new(frame.id)
            .ok_or_else(|| CanBusError::Send(format!("invalid extended CAN ID 0x{:X}", frame.id)))?;
        LinuxCanFrame::new(id, frame.data())
    };
    raw.ok_or_else(|| CanBusError::Send("invalid frame payload".to_string()))
}
