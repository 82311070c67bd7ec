//! RPC is explicitly out of scope for `umbra-core` (`spec.md`
//! Non-goals): this crate would expose `umbra_core::Chain`'s read API
//! (`best_snapshot`, `fetch_utxo`, `header_by_hash`, `locator`) and
//! `process_block` gateway over JSON-RPC. Unimplemented placeholder.

pub use umbra_core::Chain;
