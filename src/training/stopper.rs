//! Early stopping
//!
//! Watches validation loss across epochs and halts training once it has
//! failed to improve for a configured number of consecutive epochs.
//! Improvement is strict: matching the best loss exactly counts as a
//! stalled epoch.

/// Phase of the early-stopping state machine.
///
/// A fresh watcher sits in `Training` until the first epoch is observed;
/// every call to [`EarlyStopping::observe`] moves it to one of the other
/// three states. `Stopped` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopState {
    /// No validation loss observed yet.
    Training,
    /// New best loss; the caller should checkpoint now.
    Improved,
    /// No improvement, but the patience budget still has room.
    Stalled,
    /// Patience exhausted; training should halt.
    Stopped,
}

/// Validation-loss watcher with a patience budget.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    state: StopState,
    best_loss: f64,
    best_epoch: usize,
    stalled: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            state: StopState::Training,
            best_loss: f64::INFINITY,
            best_epoch: 0,
            stalled: 0,
        }
    }

    /// Feed one epoch's validation loss and advance the state machine.
    pub fn observe(&mut self, epoch: usize, val_loss: f64) -> StopState {
        self.state = match self.state {
            StopState::Stopped => StopState::Stopped,
            _ if val_loss < self.best_loss => {
                self.best_loss = val_loss;
                self.best_epoch = epoch;
                self.stalled = 0;
                StopState::Improved
            }
            _ => {
                self.stalled += 1;
                if self.stalled >= self.patience {
                    StopState::Stopped
                } else {
                    StopState::Stalled
                }
            }
        };
        self.state
    }

    /// Current state of the machine.
    pub fn state(&self) -> StopState {
        self.state
    }

    /// Best validation loss seen so far.
    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    /// Epoch that produced the best validation loss.
    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }
}
