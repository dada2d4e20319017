use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

/// One lane per recipient for notifications stored in one step and pushed
/// in a later one.
///
/// While a `DeliveryGuard` covers a user, every other record-then-deliver
/// sequence for that user waits, so live pushes leave in storage order.
#[derive(Default)]
pub struct DeliverySequencer {
    lanes: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

/// Holds the lanes of a set of recipients until dropped.
pub struct DeliveryGuard {
    _lanes: Vec<OwnedMutexGuard<()>>,
}

impl DeliverySequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lanes are taken in id order, so overlapping recipient sets never deadlock.
    pub async fn acquire(&self, recipients: &[Uuid]) -> DeliveryGuard {
        let mut users = recipients.to_vec();
        users.sort();
        users.dedup();

        let lanes: Vec<Arc<AsyncMutex<()>>> = {
            let mut lanes = self.lanes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            lanes.retain(|_, lane| Arc::strong_count(lane) > 1);
            users
                .iter()
                .map(|user_id| lanes.entry(*user_id).or_default().clone())
                .collect()
        };

        let mut held = Vec::with_capacity(lanes.len());
        for lane in lanes {
            held.push(lane.lock_owned().await);
        }
        debug!("Delivery lanes held for {} recipients", held.len());

        DeliveryGuard { _lanes: held }
    }

    pub fn lane_count(&self) -> usize {
        self.lanes
            .lock()
            .map(|lanes| lanes.len())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shared_recipient_waits() {
        let sequencer = Arc::new(DeliverySequencer::new());
        let (doctor, patient) = (Uuid::new_v4(), Uuid::new_v4());

        let guard = sequencer.acquire(&[doctor, patient]).await;

        let contender = {
            let sequencer = sequencer.clone();
            tokio::spawn(async move {
                let _guard = sequencer.acquire(&[patient]).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_disjoint_recipients_and_repeats_do_not_block() {
        let sequencer = DeliverySequencer::new();
        let user = Uuid::new_v4();

        let _first = sequencer.acquire(&[user, user]).await;
        let _second = sequencer.acquire(&[Uuid::new_v4()]).await;

        assert_eq!(sequencer.lane_count(), 2);
    }
}
