//! Actuator command worker - switches the appliance off the tick path
//!
//! The controller enqueues commands via an mpsc channel and never awaits the
//! network. The worker performs the call and publishes the acknowledged
//! appliance state on a watch channel. A failed call re-publishes the last
//! acknowledged state so the controller's mirror is corrected.

use crate::domain::types::ActuatorCommand;
use crate::infra::metrics::Metrics;
use crate::services::actuator::Actuator;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// An actuator command to be processed by the worker
#[derive(Debug, Clone, Copy)]
pub struct ActuatorCmd {
    /// Monotonic per-controller sequence number
    pub seq: u64,
    pub command: ActuatorCommand,
    /// When the command was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

/// Outcome of the command with sequence `seq`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorAck {
    pub seq: u64,
    /// Appliance state after the command (unchanged if it failed)
    pub is_on: bool,
}

/// Worker that processes actuator commands asynchronously
pub struct ActuatorWorker {
    actuator: Arc<dyn Actuator>,
    cmd_rx: mpsc::Receiver<ActuatorCmd>,
    ack_tx: watch::Sender<ActuatorAck>,
    metrics: Arc<Metrics>,
    last_acked_on: bool,
}

impl ActuatorWorker {
    pub fn new(
        actuator: Arc<dyn Actuator>,
        cmd_rx: mpsc::Receiver<ActuatorCmd>,
        ack_tx: watch::Sender<ActuatorAck>,
        metrics: Arc<Metrics>,
        initial_on: bool,
    ) -> Self {
        Self { actuator, cmd_rx, ack_tx, metrics, last_acked_on: initial_on }
    }

    /// Run the worker, processing commands until the channel closes
    pub async fn run(mut self) {
        info!(actuator = %self.actuator.name(), "actuator_worker_started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            self.process(cmd).await;
        }

        info!("actuator_worker_stopped");
    }

    async fn process(&mut self, cmd: ActuatorCmd) {
        let queue_delay_us = cmd.enqueued_at.elapsed().as_micros() as u64;
        self.metrics.record_actuator_queue_delay(queue_delay_us);

        if queue_delay_us > 1000 {
            warn!(
                seq = %cmd.seq,
                command = %cmd.command.as_str(),
                queue_delay_us = %queue_delay_us,
                "actuator_cmd_queue_delay_high"
            );
        }

        let send_start = Instant::now();
        let result = self.actuator.switch(cmd.command).await;
        let send_latency_us = send_start.elapsed().as_micros() as u64;

        match result {
            Ok(()) => {
                self.last_acked_on = cmd.command.target_is_on();
                self.metrics.record_actuator_cmd_sent(send_latency_us);
                self.metrics.set_actuator_on(self.last_acked_on);
                info!(
                    seq = %cmd.seq,
                    command = %cmd.command.as_str(),
                    queue_delay_us = %queue_delay_us,
                    send_latency_us = %send_latency_us,
                    "actuator_cmd_processed"
                );
            }
            Err(e) => {
                self.metrics.record_actuator_cmd_failed();
                error!(
                    seq = %cmd.seq,
                    command = %cmd.command.as_str(),
                    send_latency_us = %send_latency_us,
                    error = %format!("{e:#}"),
                    "actuator_cmd_failed"
                );
            }
        }

        // send_replace: succeeds even if the controller has gone away
        self.ack_tx.send_replace(ActuatorAck { seq: cmd.seq, is_on: self.last_acked_on });
    }
}

/// Create an actuator command channel, ack channel and worker
///
/// Returns the command sender and ack receiver (for the controller) and the
/// worker (to be spawned). The ack channel starts at `seq = 0`.
pub fn create_actuator_worker(
    actuator: Arc<dyn Actuator>,
    metrics: Arc<Metrics>,
    buffer_size: usize,
    initial_on: bool,
) -> (mpsc::Sender<ActuatorCmd>, watch::Receiver<ActuatorAck>, ActuatorWorker) {
    let (cmd_tx, cmd_rx) = mpsc::channel(buffer_size);
    let (ack_tx, ack_rx) = watch::channel(ActuatorAck { seq: 0, is_on: initial_on });
    let worker = ActuatorWorker::new(actuator, cmd_rx, ack_tx, metrics, initial_on);
    (cmd_tx, ack_rx, worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::actuator::MockActuator;

    fn cmd(seq: u64, command: ActuatorCommand) -> ActuatorCmd {
        ActuatorCmd { seq, command, enqueued_at: Instant::now() }
    }

    #[tokio::test]
    async fn test_success_acks_new_state() {
        let mock = Arc::new(MockActuator::new());
        let metrics = Arc::new(Metrics::new());
        let (tx, mut ack_rx, worker) =
            create_actuator_worker(mock.clone(), metrics.clone(), 8, true);
        let handle = tokio::spawn(worker.run());

        tx.send(cmd(1, ActuatorCommand::Off)).await.unwrap();
        ack_rx.changed().await.unwrap();
        assert_eq!(*ack_rx.borrow(), ActuatorAck { seq: 1, is_on: false });

        drop(tx);
        handle.await.unwrap();
        assert_eq!(mock.received(), vec![ActuatorCommand::Off]);
        assert_eq!(metrics.actuator_cmds_sent(), 1);
        assert!(!metrics.snapshot().actuator_on);
    }

    #[tokio::test]
    async fn test_failure_acks_previous_state() {
        let mock = Arc::new(MockActuator::new());
        mock.set_failing(true);
        let metrics = Arc::new(Metrics::new());
        let (tx, mut ack_rx, worker) =
            create_actuator_worker(mock.clone(), metrics.clone(), 8, true);
        let handle = tokio::spawn(worker.run());

        tx.send(cmd(7, ActuatorCommand::Off)).await.unwrap();
        ack_rx.changed().await.unwrap();
        assert_eq!(*ack_rx.borrow(), ActuatorAck { seq: 7, is_on: true });

        drop(tx);
        handle.await.unwrap();
        assert_eq!(metrics.actuator_cmds_failed(), 1);
        assert_eq!(metrics.actuator_cmds_sent(), 0);
    }
}
