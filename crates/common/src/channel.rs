//! Channel bridge between callers and the registry thread
//!
//! The device registry is owned by a single dedicated thread. Every other
//! thread talks to it through an [`EngineBridge`], so one poll or unmount
//! always runs to completion before the next command is looked at.

use async_channel::{Receiver, Sender, bounded};
use protocol::{DeviceId, DeviceSnapshot, UnmountOutcome};
use tokio::sync::oneshot;

/// Commands from callers to the registry thread
#[derive(Debug)]
pub enum EngineCommand {
    /// Collect devices and reconcile them into the registry
    Poll {
        /// Channel to send response back
        response: oneshot::Sender<Vec<DeviceSnapshot>>,
    },

    /// Look up a device without touching the OS
    Get {
        /// Device ID to look up
        id: DeviceId,
        /// Channel to send response back
        response: oneshot::Sender<Option<DeviceSnapshot>>,
    },

    /// Unmount a device's volume
    Unmount {
        /// Device ID to unmount
        id: DeviceId,
        /// Channel to send response back
        response: oneshot::Sender<UnmountOutcome>,
    },

    /// Every record held by the registry, including stale ones
    ListAll {
        /// Channel to send response back
        response: oneshot::Sender<Vec<DeviceSnapshot>>,
    },

    /// Shutdown the registry thread gracefully
    Shutdown,
}

/// Handle for callers (async or blocking)
#[derive(Clone)]
pub struct EngineBridge {
    cmd_tx: Sender<EngineCommand>,
}

impl EngineBridge {
    /// Send a command to the registry thread
    pub async fn send_command(&self, cmd: EngineCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Send a command from a thread without an async runtime
    pub fn send_command_blocking(&self, cmd: EngineCommand) -> crate::Result<()> {
        self.cmd_tx
            .send_blocking(cmd)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Poll attached devices
    pub async fn poll(&self) -> crate::Result<Vec<DeviceSnapshot>> {
        let (tx, rx) = oneshot::channel();
        self.send_command(EngineCommand::Poll { response: tx })
            .await?;
        rx.await.map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Look up a device by identifier
    pub async fn get(&self, id: DeviceId) -> crate::Result<Option<DeviceSnapshot>> {
        let (tx, rx) = oneshot::channel();
        self.send_command(EngineCommand::Get { id, response: tx })
            .await?;
        rx.await.map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Unmount a device by identifier
    pub async fn unmount(&self, id: DeviceId) -> crate::Result<UnmountOutcome> {
        let (tx, rx) = oneshot::channel();
        self.send_command(EngineCommand::Unmount { id, response: tx })
            .await?;
        rx.await.map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Every record held by the registry
    pub async fn list_all(&self) -> crate::Result<Vec<DeviceSnapshot>> {
        let (tx, rx) = oneshot::channel();
        self.send_command(EngineCommand::ListAll { response: tx })
            .await?;
        rx.await.map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Ask the registry thread to exit
    pub async fn shutdown(&self) -> crate::Result<()> {
        self.send_command(EngineCommand::Shutdown).await
    }

    /// Blocking poll
    ///
    /// Must not be called from within an async runtime.
    pub fn poll_blocking(&self) -> crate::Result<Vec<DeviceSnapshot>> {
        let (tx, rx) = oneshot::channel();
        self.send_command_blocking(EngineCommand::Poll { response: tx })?;
        rx.blocking_recv()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Blocking lookup
    ///
    /// Must not be called from within an async runtime.
    pub fn get_blocking(&self, id: DeviceId) -> crate::Result<Option<DeviceSnapshot>> {
        let (tx, rx) = oneshot::channel();
        self.send_command_blocking(EngineCommand::Get { id, response: tx })?;
        rx.blocking_recv()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Blocking unmount
    ///
    /// Must not be called from within an async runtime.
    pub fn unmount_blocking(&self, id: DeviceId) -> crate::Result<UnmountOutcome> {
        let (tx, rx) = oneshot::channel();
        self.send_command_blocking(EngineCommand::Unmount { id, response: tx })?;
        rx.blocking_recv()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Blocking shutdown request
    pub fn shutdown_blocking(&self) -> crate::Result<()> {
        self.send_command_blocking(EngineCommand::Shutdown)
    }
}

/// Handle for the registry thread (blocking)
pub struct EngineWorker {
    pub(crate) cmd_rx: Receiver<EngineCommand>,
}

impl EngineWorker {
    /// Receive a command (blocking)
    ///
    /// Fails once every bridge has been dropped.
    pub fn recv_command(&self) -> crate::Result<EngineCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<EngineCommand> {
        self.cmd_rx.try_recv().ok()
    }
}

/// Create the channel bridge between callers and the registry thread
///
/// Returns (EngineBridge for callers, EngineWorker for the registry thread)
pub fn create_engine_bridge() -> (EngineBridge, EngineWorker) {
    let (cmd_tx, cmd_rx) = bounded(64);

    (EngineBridge { cmd_tx }, EngineWorker { cmd_rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_bridge() {
        let (bridge, worker) = create_engine_bridge();

        let handle = std::thread::spawn(move || {
            let cmd = worker.recv_command().unwrap();
            matches!(cmd, EngineCommand::Poll { .. })
        });

        let (tx, _rx) = oneshot::channel();
        bridge
            .send_command(EngineCommand::Poll { response: tx })
            .await
            .unwrap();

        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_recv_fails_after_bridge_dropped() {
        let (bridge, worker) = create_engine_bridge();
        drop(bridge);

        assert!(worker.recv_command().is_err());
        assert!(worker.try_recv_command().is_none());
    }
}
