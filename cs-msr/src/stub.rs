//! Platforms without a register driver

use cs_error::{CpuidError, Result};

use crate::channel::{ChannelKind, ChannelOptions, RegisterBackend};

pub(crate) fn open(
    _core: u32,
    kind: ChannelKind,
    _options: &ChannelOptions,
) -> Result<Box<dyn RegisterBackend>> {
    Err(CpuidError::not_implemented(format!(
        "{kind:?} register access on {}",
        std::env::consts::OS
    )))
}
