//! Process-wide record of channels with a live executor

use crate::channel::ChannelId;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashSet;

static ATTACHED: Lazy<Mutex<HashSet<ChannelId>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Mark `channel` as attached; false if it already was
pub(crate) fn claim(channel: ChannelId) -> bool {
    ATTACHED.lock().insert(channel)
}

pub(crate) fn release(channel: ChannelId) -> bool {
    ATTACHED.lock().remove(&channel)
}

/// Whether an executor currently serves `channel`
pub fn is_attached(channel: ChannelId) -> bool {
    ATTACHED.lock().contains(&channel)
}
