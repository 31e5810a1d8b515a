//! An in-process transport which delays, reorders and duplicates messages.

use std::time::Duration;

use entity_sorter::RequestMessage;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::{spawn, sync::mpsc, time::sleep};

#[derive(Clone, Debug)]
pub struct Chaos {
    pub seed: u64,
    /// The probability each message is delivered twice.
    pub duplicate_rate: f64,
    /// Each copy of a message is delayed by up to this long.
    pub max_delay: Duration,
}

impl Default for Chaos {
    fn default() -> Self {
        Self {
            seed: 0,
            duplicate_rate: 0.25,
            max_delay: Duration::from_millis(50),
        }
    }
}

pub type Incoming = mpsc::UnboundedReceiver<RequestMessage>;

pub struct Outgoing {
    chaos: Chaos,
    rng: StdRng,
    tx: mpsc::UnboundedSender<RequestMessage>,
}

pub fn channel(chaos: Chaos) -> (Outgoing, Incoming) {
    let (tx, rx) = mpsc::unbounded_channel();
    let rng = StdRng::seed_from_u64(chaos.seed);

    (Outgoing { chaos, rng, tx }, rx)
}

impl Outgoing {
    /// Hand a message to the transport. The receiver sees it (at least once)
    /// after a random delay.
    pub fn send(&mut self, message: RequestMessage) {
        let copies = if self.rng.gen_bool(self.chaos.duplicate_rate) { 2 } else { 1 };

        for _ in 0..copies {
            let delay = self.chaos.max_delay.mul_f64(self.rng.gen());
            let (tx, message) = (self.tx.clone(), message.clone());

            spawn(async move {
                sleep(delay).await;
                let _ = tx.send(message);
            });
        }
    }
}
