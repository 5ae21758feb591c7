//! Structured decoding of EVM revert payloads.
//!
//! Known selectors (`Error(string)`, `Panic(uint256)`) decode to readable
//! reasons; contract-defined custom errors surface as their selector.

use alloy::hex;
use alloy::primitives::U256;
use alloy::sol_types::SolValue;

/// `Error(string)` selector.
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// `Panic(uint256)` selector.
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Renders a revert payload as a structured reason.
pub fn decode_revert(data: &[u8]) -> String {
    if data.is_empty() {
        return "execution reverted (no data)".to_string();
    }
    if data.len() < 4 {
        return format!("execution reverted (0x{})", hex::encode(data));
    }

    let (selector, payload) = data.split_at(4);
    if selector == ERROR_SELECTOR {
        if let Ok(reason) = <String>::abi_decode(payload, true) {
            return format!("Error(\"{reason}\")");
        }
    }
    if selector == PANIC_SELECTOR {
        if let Ok(code) = <U256>::abi_decode(payload, true) {
            return format!("Panic(0x{code:02x}: {})", panic_reason(&code));
        }
    }
    format!("custom error 0x{}", hex::encode(selector))
}

/// Pulls revert bytes out of a JSON-RPC error `data` member, which nodes
/// format inconsistently ("0x…", "Reverted 0x…", or a quoted variant).
pub fn revert_bytes(error_data: &str) -> Option<Vec<u8>> {
    let start = error_data.find("0x")?;
    let digits = &error_data[start + 2..];
    let end = digits
        .find(|c: char| !c.is_ascii_hexdigit())
        .unwrap_or(digits.len());
    hex::decode(&digits[..end]).ok()
}

fn panic_reason(code: &U256) -> &'static str {
    match code.as_limbs()[0] {
        0x01 => "assertion failed",
        0x11 => "arithmetic overflow",
        0x12 => "division by zero",
        0x21 => "invalid enum value",
        0x22 => "corrupted storage byte array",
        0x31 => "pop on empty array",
        0x32 => "array index out of bounds",
        0x41 => "out of memory",
        0x51 => "uninitialized function pointer",
        _ => "unknown panic code",
    }
}
