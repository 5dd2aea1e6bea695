use rand::RngCore;

/// Generator returning the same word forever.
///
/// With `0` every probability gate passes and every uniform draw returns the
/// low end of its range. With `u64::MAX` every gate below 1 fails.
pub struct FixedRng(pub u64);

impl RngCore for FixedRng {
    fn next_u32(&mut self) -> u32 {
        self.0 as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.0
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        let bytes = self.0.to_le_bytes();
        for (i, b) in dst.iter_mut().enumerate() {
            *b = bytes[i % 8];
        }
    }
}

pub fn always() -> FixedRng {
    FixedRng(0)
}

pub fn never() -> FixedRng {
    FixedRng(u64::MAX)
}
