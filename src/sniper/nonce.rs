//! Nonce Guard
//!
//! Serializes "fetch pending nonce → pick a value" per sniper. The chain's pending
//! nonce lags behind transactions we are still building or that sit in a relay
//! bundle, so a local floor (last handed out + 1) is kept and the larger of the
//! two wins. Values released after a failed build or submit are reused first.
//!
//! Created: 2026-10-18

use std::collections::BTreeSet;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct NonceState {
    /// next value never handed out
    floor: Option<u64>,
    /// handed out, then given back unused
    released: BTreeSet<u64>,
}

#[derive(Default)]
pub struct NonceGuard {
    state: Mutex<NonceState>,
}

impl NonceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a nonce. `fetch_pending` is awaited while the guard is held, so no two
    /// concurrent reservations observe the same chain value.
    pub async fn reserve<F, Fut, E>(&self, fetch_pending: F) -> Result<u64, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64, E>>,
    {
        let mut state = self.state.lock().await;
        let chain_pending = fetch_pending().await?;

        // anything below the chain's pending nonce has been used by someone else
        state.released = state.released.split_off(&chain_pending);

        let nonce = match state.released.pop_first() {
            Some(reused) => reused,
            None => {
                let nonce = state.floor.map_or(chain_pending, |floor| floor.max(chain_pending));
                state.floor = Some(nonce + 1);
                nonce
            }
        };
        debug!("Nonce reserved | nonce={} | chain_pending={}", nonce, chain_pending);
        Ok(nonce)
    }

    /// Give back a nonce whose transaction never reached the network
    pub async fn release(&self, nonce: u64) {
        let mut state = self.state.lock().await;
        match state.floor {
            Some(floor) if floor == nonce + 1 => {
                state.floor = Some(nonce);
                // fold trailing released values back into the floor
                while let Some(&top) = state.released.last() {
                    if Some(top + 1) == state.floor {
                        state.released.remove(&top);
                        state.floor = Some(top);
                    } else {
                        break;
                    }
                }
            }
            Some(floor) if nonce < floor => {
                state.released.insert(nonce);
            }
            _ => {}
        }
        debug!("Nonce released | nonce={}", nonce);
    }
}
