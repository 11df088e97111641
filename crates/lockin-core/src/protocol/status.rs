//! Status and overload byte decoding.
//!
//! Every transport reports status differently (inline byte, `ST` reply text,
//! serial poll, prompt character), but all of them end up here as one raw
//! byte. Only bits 0-3 and 7 mean the same thing on every model.

use std::fmt;

use super::constants::*;

/// Status byte with the model-dependent bits (4-6) cleared.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CanonicalStatus(u8);

/// Mask a raw status byte down to the portable bits.
pub const fn decode_status(raw: u8) -> CanonicalStatus {
    CanonicalStatus(raw & STATUS_MASK)
}

/// Reinterpret a raw overload byte as eight independent flags.
pub const fn decode_overload(raw: u8) -> CanonicalOverload {
    CanonicalOverload(raw)
}

impl CanonicalStatus {
    /// Masked value.
    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, flag: StatusFlag) -> bool {
        self.0 & flag.mask() != 0
    }

    pub const fn command_done(&self) -> bool {
        self.contains(StatusFlag::CommandDone)
    }

    pub const fn invalid_command(&self) -> bool {
        self.contains(StatusFlag::InvalidCommand)
    }

    pub const fn parameter_error(&self) -> bool {
        self.contains(StatusFlag::ParameterError)
    }

    pub const fn reference_unlock(&self) -> bool {
        self.contains(StatusFlag::ReferenceUnlock)
    }

    pub const fn data_available(&self) -> bool {
        self.contains(StatusFlag::DataAvailable)
    }

    /// True when the instrument flagged a bad command or parameter.
    pub const fn is_error(&self) -> bool {
        self.invalid_command() || self.parameter_error()
    }

    /// Set flags, lowest bit first. Calling again restarts from bit 0.
    pub fn flags(&self) -> StatusFlags {
        StatusFlags {
            status: *self,
            next: 0,
        }
    }

    /// Human readable description of every set flag, lowest bit first.
    pub fn describe(&self) -> impl Iterator<Item = &'static str> + Clone {
        self.flags().map(StatusFlag::description)
    }
}

impl fmt::Debug for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalStatus({:#04X}", self.0)?;
        for flag in self.flags() {
            write!(f, " {:?}", flag)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Portable status bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFlag {
    CommandDone,
    InvalidCommand,
    ParameterError,
    ReferenceUnlock,
    DataAvailable,
}

impl StatusFlag {
    /// In bit order.
    pub const ALL: [StatusFlag; 5] = [
        StatusFlag::CommandDone,
        StatusFlag::InvalidCommand,
        StatusFlag::ParameterError,
        StatusFlag::ReferenceUnlock,
        StatusFlag::DataAvailable,
    ];

    pub const fn mask(self) -> u8 {
        match self {
            StatusFlag::CommandDone => STB_COMMAND_DONE,
            StatusFlag::InvalidCommand => STB_INVALID_COMMAND,
            StatusFlag::ParameterError => STB_PARAMETER_ERROR,
            StatusFlag::ReferenceUnlock => STB_REFERENCE_UNLOCK,
            StatusFlag::DataAvailable => STB_DATA_AVAILABLE,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            StatusFlag::CommandDone => "Command Done",
            StatusFlag::InvalidCommand => "Invalid command",
            StatusFlag::ParameterError => "Command parameter error",
            StatusFlag::ReferenceUnlock => "Reference unlock",
            StatusFlag::DataAvailable => "Data Available",
        }
    }
}

impl fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Iterator over the set flags of a [`CanonicalStatus`].
#[derive(Debug, Clone)]
pub struct StatusFlags {
    status: CanonicalStatus,
    next: usize,
}

impl Iterator for StatusFlags {
    type Item = StatusFlag;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(&flag) = StatusFlag::ALL.get(self.next) {
            self.next += 1;
            if self.status.contains(flag) {
                return Some(flag);
            }
        }
        None
    }
}

/// USB overload byte. No masking: all eight bits are meaningful.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CanonicalOverload(u8);

impl CanonicalOverload {
    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, flag: OverloadFlag) -> bool {
        self.0 & flag.mask() != 0
    }

    pub const fn any(&self) -> bool {
        self.0 != 0
    }

    pub fn flags(&self) -> impl Iterator<Item = OverloadFlag> + Clone {
        let overload = *self;
        OverloadFlag::ALL
            .into_iter()
            .filter(move |flag| overload.contains(*flag))
    }

    pub fn describe(&self) -> impl Iterator<Item = &'static str> + Clone {
        self.flags().map(OverloadFlag::description)
    }
}

impl fmt::Debug for CanonicalOverload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalOverload({:#04X})", self.0)
    }
}

/// Output overload bits, bit 0 first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverloadFlag {
    X1,
    Y1,
    X2,
    Y2,
    Ch1,
    Ch2,
    Ch3,
    Ch4,
}

impl OverloadFlag {
    pub const ALL: [OverloadFlag; 8] = [
        OverloadFlag::X1,
        OverloadFlag::Y1,
        OverloadFlag::X2,
        OverloadFlag::Y2,
        OverloadFlag::Ch1,
        OverloadFlag::Ch2,
        OverloadFlag::Ch3,
        OverloadFlag::Ch4,
    ];

    pub const fn bit(self) -> u8 {
        self as u8
    }

    pub const fn mask(self) -> u8 {
        1 << self.bit()
    }

    pub const fn description(self) -> &'static str {
        match self {
            OverloadFlag::X1 => "X(1) output overload",
            OverloadFlag::Y1 => "Y(1) output overload",
            OverloadFlag::X2 => "X2 output overload",
            OverloadFlag::Y2 => "Y2 output overload",
            OverloadFlag::Ch1 => "CH1 output overload",
            OverloadFlag::Ch2 => "CH2 output overload",
            OverloadFlag::Ch3 => "CH3 output overload",
            OverloadFlag::Ch4 => "CH4 output overload",
        }
    }
}

impl fmt::Display for OverloadFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mask_all_bytes() {
        for raw in 0..=u8::MAX {
            let status = decode_status(raw);
            assert_eq!(status.bits(), raw & 0x8F);
            assert_eq!(decode_status(status.bits()), status);
            assert_eq!(status.bits() & 0x70, 0);
        }
    }

    #[test]
    fn test_overload_bits_independent() {
        for raw in 0..=u8::MAX {
            let overload = decode_overload(raw);
            for flag in OverloadFlag::ALL {
                let bit_set = raw & (1 << flag.bit()) != 0;
                assert_eq!(overload.contains(flag), bit_set, "raw={raw:#04X} {flag:?}");
            }
        }
    }

    #[test]
    fn test_describe_order() {
        let status = decode_status(0xFF);
        let text: Vec<_> = status.describe().collect();
        assert_eq!(
            text,
            vec![
                "Command Done",
                "Invalid command",
                "Command parameter error",
                "Reference unlock",
                "Data Available",
            ]
        );
    }

    #[test]
    fn test_describe_restartable() {
        let status = decode_status(0x09);
        let iter = status.describe();
        let first: Vec<_> = iter.clone().collect();
        let second: Vec<_> = iter.collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["Command Done", "Reference unlock"]);
        assert_eq!(status.flags().count(), 2);
    }

    #[test]
    fn test_status_accessors() {
        let status = decode_status(0x06);
        assert!(!status.command_done());
        assert!(status.invalid_command());
        assert!(status.parameter_error());
        assert!(status.is_error());
        assert!(decode_status(0x80).data_available());
        assert_eq!(decode_status(0x70).flags().count(), 0);
    }

    #[test]
    fn test_overload_describe() {
        let overload = decode_overload(0x81);
        let text: Vec<_> = overload.describe().collect();
        assert_eq!(text, vec!["X(1) output overload", "CH4 output overload"]);
        assert!(!decode_overload(0).any());
    }
}
