use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

static TOOL_USE_COUNTER: AtomicU64 = AtomicU64::new(1);
static PROCESS_SEED: LazyLock<u64> = LazyLock::new(|| fastrand::u64(..));
const HEX: &[u8; 16] = b"0123456789abcdef";

#[inline]
pub(crate) fn mix_u64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[inline]
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// Unique id for a tool call the vendor sent without one.
///
/// Ids are unique within the process and unlikely to collide across
/// processes because the counter is mixed with a per-process random seed.
#[inline]
pub(crate) fn next_tool_use_id() -> String {
    let seq = TOOL_USE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut out = String::with_capacity(24);
    out.push_str("tooluse_");
    push_u64_hex_16(&mut out, mix_u64(*PROCESS_SEED ^ seq));
    out
}

/// Opaque random token, used for the OAuth `state` parameter.
pub(crate) fn random_token() -> String {
    let mut out = String::with_capacity(32);
    push_u64_hex_16(&mut out, fastrand::u64(..));
    push_u64_hex_16(&mut out, fastrand::u64(..));
    out
}

#[inline]
fn push_u64_hex_16(out: &mut String, mut value: u64) {
    let mut buf = [b'0'; 16];
    let mut idx = 16;
    while idx > 0 {
        idx -= 1;
        let nibble = usize::try_from(value & 0x0f).unwrap_or(0);
        buf[idx] = HEX[nibble];
        value >>= 4;
    }
    for byte in buf {
        out.push(char::from(byte));
    }
}

/// Truncate a string to at most `max` bytes on a char boundary, for log fields.
pub(crate) fn truncate_for_log(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
