//! Echoing I3C target model
//!
//! Stores whatever the controller last wrote and returns it on the next read.

use heapless::Vec;

/// First dynamic address handed out on a freshly reset bus
pub const DEFAULT_DYNAMIC_ADDRESS: u8 = 0x08;

/// Target-side model of the loopback peer
#[derive(Debug, Clone)]
pub struct EchoTarget<const CAP: usize> {
    static_address: u8,
    planned_address: u8,
    dynamic_address: Option<u8>,
    storage: Vec<u8, CAP>,
    nack_first_assign: bool,
    assign_requests: u32,
    assigns_since_reset: u32,
    writes: u32,
    reads: u32,
    corrupt_at: Option<u32>,
}

impl<const CAP: usize> EchoTarget<CAP> {
    pub fn new(static_address: u8, dynamic_address: u8) -> Self {
        Self {
            static_address,
            planned_address: dynamic_address,
            dynamic_address: None,
            storage: Vec::new(),
            nack_first_assign: false,
            assign_requests: 0,
            assigns_since_reset: 0,
            writes: 0,
            reads: 0,
            corrupt_at: None,
        }
    }

    /// Ignore the first address assignment after reset
    pub fn nack_first_assign(mut self, nack: bool) -> Self {
        self.nack_first_assign = nack;
        self
    }

    /// Flip the first echoed byte on the `read`-th read (1-based)
    pub fn corrupt_at(mut self, read: Option<u32>) -> Self {
        self.corrupt_at = read;
        self
    }

    pub fn static_address(&self) -> u8 {
        self.static_address
    }

    /// Address the target will answer to once assigned
    pub fn planned_address(&self) -> u8 {
        self.planned_address
    }

    pub fn dynamic_address(&self) -> Option<u8> {
        self.dynamic_address
    }

    /// Assignment requests on the target's static address, across resets
    pub fn assign_requests(&self) -> u32 {
        self.assign_requests
    }

    pub fn writes(&self) -> u32 {
        self.writes
    }

    pub fn reads(&self) -> u32 {
        self.reads
    }

    /// Last bytes written by the controller
    pub fn stored(&self) -> &[u8] {
        &self.storage
    }

    /// Handle a dynamic address assignment request
    ///
    /// Returns `true` if the target acknowledged and took the address.
    pub fn assign(&mut self, static_address: u8) -> bool {
        if static_address != self.static_address {
            return false;
        }

        self.assign_requests += 1;
        self.assigns_since_reset += 1;
        if self.nack_first_assign && self.assigns_since_reset == 1 {
            return false;
        }

        self.dynamic_address = Some(self.planned_address);
        true
    }

    /// Handle a private write; `false` is a NACK
    pub fn write(&mut self, address: u8, data: &[u8]) -> bool {
        if self.dynamic_address != Some(address) {
            return false;
        }

        self.storage.clear();
        if self.storage.extend_from_slice(data).is_err() {
            return false;
        }
        self.writes += 1;
        true
    }

    /// Handle a private read; `false` is a NACK
    ///
    /// Bytes past the stored data read back as `0xFF` (bus idle).
    pub fn read(&mut self, address: u8, buffer: &mut [u8]) -> bool {
        if self.dynamic_address != Some(address) {
            return false;
        }

        self.reads += 1;
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = self.storage.get(i).copied().unwrap_or(0xFF);
        }

        if self.corrupt_at == Some(self.reads) {
            if let Some(first) = buffer.first_mut() {
                *first ^= 0xFF;
            }
        }
        true
    }

    /// Forget the assigned address and stored data
    ///
    /// The next assignment is treated as the first after reset again.
    pub fn reset(&mut self) {
        self.dynamic_address = None;
        self.storage.clear();
        self.assigns_since_reset = 0;
    }
}
