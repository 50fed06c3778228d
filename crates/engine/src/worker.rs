//! Registry worker thread
//!
//! Dedicated thread owning the [`DeviceEngine`]. Callers reach it through an
//! [`EngineBridge`](common::EngineBridge), so polls and unmounts issued from
//! many threads or tasks are applied one at a time.
//!
//! Backend calls block this thread for their whole duration. There are no
//! timeouts: a hung OS call stalls every queued command behind it.

use crate::engine::DeviceEngine;
use common::{EngineCommand, EngineWorker, Platform};
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// Registry worker thread
///
/// Processes commands from callers until a Shutdown command arrives or every
/// bridge has been dropped.
pub struct EngineWorkerThread<P: Platform> {
    /// Engine owned by this thread
    engine: DeviceEngine<P>,
    /// Communication channel with callers
    worker: EngineWorker,
}

impl<P: Platform> EngineWorkerThread<P> {
    /// Create a new worker around an engine
    pub fn new(worker: EngineWorker, engine: DeviceEngine<P>) -> Self {
        Self { engine, worker }
    }

    /// Run the command loop
    ///
    /// Returns the engine so callers can inspect the final registry.
    pub fn run(mut self) -> DeviceEngine<P> {
        info!(
            "Registry worker started (backend: {})",
            self.engine.platform().name()
        );

        loop {
            match self.worker.recv_command() {
                Ok(EngineCommand::Shutdown) => {
                    info!("Registry worker shutting down");
                    break;
                }
                Ok(cmd) => self.handle_command(cmd),
                Err(e) => {
                    debug!("All engine bridges dropped: {}", e);
                    break;
                }
            }
        }

        info!("Registry worker stopped");
        self.engine
    }

    /// Handle a command from a caller
    fn handle_command(&mut self, cmd: EngineCommand) {
        // A panic drops the reply sender, so the caller sees a channel error
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.handle_command_inner(cmd)
        }));

        if let Err(e) = result {
            error!("Panic in registry command handler: {:?}", e);
        }
    }

    /// Inner command handler (can panic, caught by handle_command)
    fn handle_command_inner(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Poll { response } => {
                let devices = self.engine.poll();
                debug!("Poll returned {} device(s)", devices.len());
                let _ = response.send(devices);
            }

            EngineCommand::Get { id, response } => {
                let _ = response.send(self.engine.get(&id));
            }

            EngineCommand::Unmount { id, response } => {
                debug!("Unmounting device {}", id);
                let outcome = self.engine.unmount(&id);
                let _ = response.send(outcome);
            }

            EngineCommand::ListAll { response } => {
                let _ = response.send(self.engine.list_all());
            }

            EngineCommand::Shutdown => {
                // Handled in run()
            }
        }
    }
}

/// Spawn the registry worker thread
///
/// The thread runs until a Shutdown command is received or every bridge is
/// dropped, and hands the engine back through the join handle.
pub fn spawn_engine_worker<P>(
    worker: EngineWorker,
    engine: DeviceEngine<P>,
) -> std::io::Result<JoinHandle<DeviceEngine<P>>>
where
    P: Platform + 'static,
{
    std::thread::Builder::new()
        .name("registry-worker".to_string())
        .spawn(move || EngineWorkerThread::new(worker, engine).run())
}
