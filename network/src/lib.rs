//! P2P networking is explicitly out of scope for `umbra-core`
//! (`spec.md` Non-goals): the consensus engine only ever sees complete
//! blocks and headers handed to it by whatever transport lives here.
//! This crate is an unimplemented placeholder for that transport.
