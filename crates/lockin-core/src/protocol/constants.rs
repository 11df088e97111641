//! Protocol constants for the 72xx / 7124 lock-in amplifier family.

use std::time::Duration;

// ============================================================================
// Device Identification
// ============================================================================

/// Vendor ID shared by every lock-in model on the USB bus.
pub const LOCKIN_VENDOR_ID: u16 = 0x0A2D;

/// Model 7270 Product ID
pub const MODEL_7270_PRODUCT_ID: u16 = 0x001B;
/// Model 7230 Product ID
pub const MODEL_7230_PRODUCT_ID: u16 = 0x0027;
/// Model 7124 Product ID
pub const MODEL_7124_PRODUCT_ID: u16 = 0x0018;

/// Raw TCP port the instrument listens on.
pub const ETHERNET_PORT: u16 = 50001;

// ============================================================================
// Framing
// ============================================================================

pub const CR: u8 = b'\r';
pub const LF: u8 = b'\n';

/// Command terminator for Ethernet and RS232.
pub const COMMAND_TERMINATOR: u8 = CR;

/// USB reply trailer: [overload][status][LF][NUL]
pub const USB_TRAILER_LEN: usize = 4;

/// RS232 prompt: command completed, no error.
pub const PROMPT_OK: u8 = b'*';
/// RS232 prompt: command completed, status needs checking.
pub const PROMPT_CHECK: u8 = b'?';

/// Status-query command.
pub const STATUS_QUERY: &str = "ST";

/// Sentinel that ends terminal mode.
pub const TERMINAL_STOP: &str = "STOP";

// ============================================================================
// Status Byte Bits
// ============================================================================

pub const STB_COMMAND_DONE: u8 = 0x01;
pub const STB_INVALID_COMMAND: u8 = 0x02;
pub const STB_PARAMETER_ERROR: u8 = 0x04;
pub const STB_REFERENCE_UNLOCK: u8 = 0x08;
pub const STB_DATA_AVAILABLE: u8 = 0x80;

/// Bits 4, 5 and 6 differ between models and are masked off.
pub const STATUS_MASK: u8 = 0x8F;

// ============================================================================
// Sizes / Timing
// ============================================================================

/// Largest single reply frame read from USB or GPIB.
pub const MAX_FRAME_SIZE: usize = 4096;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);
