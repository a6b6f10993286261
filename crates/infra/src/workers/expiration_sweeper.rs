use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use stockroom_inventory::Reservation;

use crate::config::ConfigError;
use crate::error::InventoryError;
use crate::inventory_store::{ExpirationQuery, ReservationManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Time between two sweeps.
    pub interval: Duration,
    /// Upper bound on reservations released per sweep.
    pub batch_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 500,
        }
    }
}

impl SweeperConfig {
    /// A zero interval would panic the ticker; a zero batch would never release anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "RESERVATION_SWEEP_INTERVAL_SECS",
                value: format!("{:?}", self.interval),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "RESERVATION_SWEEP_BATCH",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub released: usize,
    /// Reservations settled by someone else between scan and release.
    pub skipped: usize,
    pub failed: usize,
}

/// Releases reservations whose `expires_at` has passed.
///
/// Expiry is cooperative: nothing else in the engine looks at `expires_at`,
/// so expired holds keep their stock until a sweep releases them. The sweeper
/// only uses the public `ExpirationQuery` and `ReservationManager` surface;
/// a reservation confirmed concurrently simply comes back `AlreadyProcessed`
/// and is counted as skipped.
pub struct ExpirationSweeper<S: ?Sized> {
    store: Arc<S>,
    config: SweeperConfig,
}

impl<S> ExpirationSweeper<S>
where
    S: ExpirationQuery + ReservationManager + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, config: SweeperConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> SweeperConfig {
        self.config
    }

    /// Scan once for reservations expired before `as_of` and release them.
    ///
    /// Only the scan can fail the sweep; individual release failures are
    /// logged and counted in the report.
    #[instrument(skip(self, as_of), fields(as_of = %as_of, batch_size = self.config.batch_size), err)]
    pub async fn sweep_once(&self, as_of: DateTime<Utc>) -> Result<SweepReport, InventoryError> {
        let expired = self
            .store
            .get_expired_reservations(as_of, self.config.batch_size)
            .await?;
        Ok(self.release_all(&expired).await)
    }

    async fn release_all(&self, reservations: &[Reservation]) -> SweepReport {
        let mut report = SweepReport {
            scanned: reservations.len(),
            ..SweepReport::default()
        };

        for reservation in reservations {
            match self.store.release_reservation(reservation.id).await {
                Ok(_) => report.released += 1,
                Err(InventoryError::AlreadyProcessed { status, .. }) => {
                    debug!(reservation_id = %reservation.id, %status, "expired reservation already settled");
                    report.skipped += 1;
                }
                Err(InventoryError::NotFound(_)) => report.skipped += 1,
                Err(err) => {
                    warn!(
                        reservation_id = %reservation.id,
                        order_id = %reservation.order_id,
                        error = %err,
                        retryable = err.is_retryable(),
                        "failed to release expired reservation"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Sweep on every tick until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// The first sweep runs immediately.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "expiration sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once(Utc::now()).await {
                        Ok(report) if report.scanned > 0 => info!(
                            scanned = report.scanned,
                            released = report.released,
                            skipped = report.skipped,
                            failed = report.failed,
                            "expiration sweep finished"
                        ),
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "expiration sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("expiration sweeper stopped");
    }

    /// Run the sweeper on the current tokio runtime.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(shutdown_rx));
        SweeperHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

/// Handle to stop and join a spawned sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Request graceful shutdown and wait for the current sweep to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                warn!(error = %err, "expiration sweeper task ended abnormally");
            }
        }
    }
}
