//! Deterministic record identifiers
//!
//! Job producers (the mobile and web clients) name the expense/income record
//! for a transaction event without talking to the backend. Both sides hash the
//! event's `txKey` with djb2 and must agree bit-for-bit, so the hash runs over
//! UTF-16 code units with unsigned 32-bit wraparound, exactly as the clients
//! do.

/// Prefix applied to every derived record identifier
pub const RECORD_ID_PREFIX: &str = "ing_";

const DJB2_SEED: u32 = 5381;

/// djb2 over the UTF-16 code units of `input`, masked to 31 bits
pub fn djb2_31(input: &str) -> u32 {
    let hash = input.encode_utf16().fold(DJB2_SEED, |acc, unit| {
        (acc << 5).wrapping_add(acc).wrapping_add(u32::from(unit))
    });
    hash & 0x7fff_ffff
}

/// Derive the record identifier for a transaction key (`ing_<lowercase hex>`)
pub fn record_id_from_tx_key(tx_key: &str) -> String {
    format!("{}{:x}", RECORD_ID_PREFIX, djb2_31(tx_key))
}
