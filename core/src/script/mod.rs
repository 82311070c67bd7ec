//! Script verifier (C9): wires the interpreter and signature cache
//! together behind the one entry point the connect engine calls,
//! fanning out across a block's inputs on the bounded worker pool
//! `spec.md` §5 describes.

pub mod interpreter;
pub mod opcodes;
pub mod sigcache;

use crate::collaborators::ScriptWorkers;
use crate::error::RuleError;
use crate::params::ChainParams;
use crate::primitives::{Transaction, TxOut};
use interpreter::{verify_script, VerifyContext};
use sigcache::SignatureCache;

/// Which height-gated rules apply to the block currently being
/// verified, resolved once per block rather than re-derived per input.
#[derive(Debug, Clone, Copy)]
pub struct ScriptRules {
    pub p2sh_active: bool,
    pub bip65_active: bool,
    pub bip66_active: bool,
}

impl ScriptRules {
    pub fn at_height(height: i32, params: &ChainParams) -> Self {
        ScriptRules {
            p2sh_active: height >= params.bip0016_height,
            bip65_active: height >= params.bip0065_height,
            bip66_active: height >= params.bip0066_height,
        }
    }
}

/// One non-coinbase input to verify: its index within `tx` and the
/// output it spends.
pub struct InputToVerify<'a> {
    pub tx: &'a Transaction,
    pub input_index: usize,
    pub prev_out: &'a TxOut,
}

/// Verifies every input in `inputs` against its claimed previous
/// output, fanned out across `workers`. Returns the first failure
/// encountered, if any; per `spec.md` §4.8 the caller must not observe
/// any partial result — it either gets every input verified or a
/// single `ErrScriptValidation`.
pub fn verify_inputs(
    inputs: &[InputToVerify<'_>],
    rules: ScriptRules,
    sig_cache: &SignatureCache,
    workers: &dyn ScriptWorkers,
) -> Result<(), RuleError> {
    let verify = |input: &InputToVerify<'_>| {
        let ctx = VerifyContext {
            tx: input.tx,
            input_index: input.input_index,
            bip65_active: rules.bip65_active,
            bip66_active: rules.bip66_active,
            sig_cache,
        };
        let script_sig = &input.tx.inputs[input.input_index].signature_script;
        verify_script(script_sig, &input.prev_out.pub_key_script, rules.p2sh_active, &ctx)
    };
    workers.verify_all(inputs, &verify)
}
