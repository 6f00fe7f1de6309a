//! Fixed-length transfer buffers
//!
//! Both ends agree on the transfer length out-of-band; nothing about the
//! length travels on the wire.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Transfer length used when none is given
pub const DEFAULT_TRANSFER_LEN: usize = 4;

/// Initial outbound payload for the default length
pub const DEFAULT_SEED: [u8; DEFAULT_TRANSFER_LEN] = [0x00, 0x01, 0x02, 0x03];

/// First differing byte between sent and received data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Mismatch {
    /// Byte offset
    pub index: usize,
    /// Byte that was transmitted
    pub expected: u8,
    /// Byte that came back
    pub actual: u8,
}

/// Fixed-length byte buffer for one direction of the exchange
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferBuffer<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> Default for TransferBuffer<N> {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl<const N: usize> TransferBuffer<N> {
    /// Create a buffer holding `bytes`
    pub const fn new(bytes: [u8; N]) -> Self {
        Self { bytes }
    }

    /// Create an all-zero buffer
    pub const fn zeroed() -> Self {
        Self { bytes: [0; N] }
    }

    /// Generate the next payload: every byte incremented by one, wrapping
    pub fn advance(&mut self) {
        for byte in self.bytes.iter_mut() {
            *byte = byte.wrapping_add(1);
        }
    }

    /// Reset every byte to zero
    pub fn clear(&mut self) {
        self.bytes = [0; N];
    }

    /// Buffer length (always `N`)
    pub const fn len(&self) -> usize {
        N
    }

    /// Check if this is a zero-length buffer
    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Compare against the data echoed back
    ///
    /// Returns the first differing byte, if any.
    pub fn compare(&self, received: &Self) -> Result<(), Mismatch> {
        match self
            .bytes
            .iter()
            .zip(received.bytes.iter())
            .position(|(sent, got)| sent != got)
        {
            None => Ok(()),
            Some(index) => Err(Mismatch {
                index,
                expected: self.bytes[index],
                actual: received.bytes[index],
            }),
        }
    }
}

impl<const N: usize> From<[u8; N]> for TransferBuffer<N> {
    fn from(bytes: [u8; N]) -> Self {
        Self::new(bytes)
    }
}

impl<const N: usize> AsRef<[u8]> for TransferBuffer<N> {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_advance_from_seed() {
        let mut buf = TransferBuffer::new(DEFAULT_SEED);
        buf.advance();
        assert_eq!(buf.as_slice(), &[0x01, 0x02, 0x03, 0x04]);
        buf.advance();
        assert_eq!(buf.as_slice(), &[0x02, 0x03, 0x04, 0x05]);
    }

    #[test]
    fn test_advance_wraps() {
        let mut buf = TransferBuffer::new([0xFF, 0xFE]);
        buf.advance();
        assert_eq!(buf.as_slice(), &[0x00, 0xFF]);
    }

    #[test]
    fn test_clear() {
        let mut buf = TransferBuffer::new([9, 9, 9]);
        buf.clear();
        assert_eq!(buf, TransferBuffer::zeroed());
    }

    #[test]
    fn test_compare_reports_first_difference() {
        let sent = TransferBuffer::new([1, 2, 3, 4]);
        let got = TransferBuffer::new([1, 2, 0, 0]);
        assert_eq!(
            sent.compare(&got),
            Err(Mismatch {
                index: 2,
                expected: 3,
                actual: 0,
            })
        );
        assert_eq!(sent.compare(&sent.clone()), Ok(()));
    }

    proptest! {
        #[test]
        fn prop_identical_buffers_match(bytes in prop::array::uniform8(any::<u8>())) {
            let sent = TransferBuffer::new(bytes);
            let mut received = TransferBuffer::zeroed();
            received.as_mut_slice().copy_from_slice(sent.as_slice());
            prop_assert_eq!(sent.compare(&received), Ok(()));
        }

        #[test]
        fn prop_single_corruption_detected(
            bytes in prop::array::uniform8(any::<u8>()),
            index in 0usize..8,
            flip in 1u8..=255,
        ) {
            let sent = TransferBuffer::new(bytes);
            let mut received = sent.clone();
            received.as_mut_slice()[index] ^= flip;
            let mismatch = sent.compare(&received).unwrap_err();
            prop_assert_eq!(mismatch.index, index);
            prop_assert_eq!(mismatch.expected, bytes[index]);
        }

        #[test]
        fn prop_advance_is_bytewise_increment(bytes in prop::array::uniform4(any::<u8>()), steps in 0u16..600) {
            let mut buf = TransferBuffer::new(bytes);
            for _ in 0..steps {
                buf.advance();
            }
            for (i, byte) in buf.as_slice().iter().enumerate() {
                prop_assert_eq!(*byte, bytes[i].wrapping_add(steps as u8));
            }
        }
    }
}
