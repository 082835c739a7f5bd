//! Helpers shared by unit and integration tests; not part of the stable API.

use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::imaging::placeholder_png;

/// Size used for fixture images: comfortably inside the accepted file-size window.
pub const FIXTURE_IMAGE_BYTES: usize = 48 * 1024;

/// A PNG header of the given dimensions at the fixture size.
#[must_use]
pub fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    placeholder_png(width, height, FIXTURE_IMAGE_BYTES, u64::from(width) ^ u64::from(height))
}

/// Serialize tests that touch process-global environment variables.
pub fn env_guard() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::read_dimensions;

    #[test]
    fn test_fixture_size_and_dimensions() {
        let png = png_fixture(1440, 900);
        assert_eq!(png.len(), FIXTURE_IMAGE_BYTES);
        assert_eq!(read_dimensions(&png), Some((1440, 900)));
    }
}
