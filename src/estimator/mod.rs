//! Network estimators
//!
//! The three leaf components the correction engine feeds on every matched
//! server response:
//! - **RTT Estimator**: smoothed RTT and variance from weighted samples
//! - **Floor Tracker**: sliding-window minimum RTT and the latency floor
//! - **Packet Burst Tracker**: trailing 50 ms packet count and the trust
//!   weight derived from it
//!
//! # Architecture
//!
//! ```text
//! Server response
//!   └─> rtt = applied_lock - old_lock
//!       ├─> FloorTracker::add_sample(rtt)        (always)
//!       └─> RttEstimator::add_sample(rtt, w)     (only above the floor)
//!             └─> w = PacketBurstTracker::rtt_weight()
//! ```
//!
//! # Usage
//!
//! ```
//! use action_lock_engine::estimator::{FloorTracker, PacketBurstTracker, RttEstimator};
//!
//! let mut rtt = RttEstimator::default();
//! let mut floor = FloorTracker::default();
//! let burst = PacketBurstTracker::new();
//!
//! floor.add_sample(0.085);
//! if 0.085 > floor.floor() {
//!     rtt.add_sample(0.085, burst.rtt_weight());
//! }
//! assert_eq!(rtt.smoothed_rtt(), Some(0.085));
//! ```

mod burst;
mod floor;
mod rtt;

pub use burst::{PacketBurstTracker, PacketEvent, SLOT_COUNT, SLOT_DURATION};
pub use floor::{
    FloorParams, FloorTracker, DEFAULT_FLOOR, MINIMUM_FLOOR, MIN_ADAPTIVE_SAMPLES, MIN_WINDOW_SIZE,
};
pub use rtt::{RttEstimator, RttParams, MIN_SMOOTHED_RTT};
