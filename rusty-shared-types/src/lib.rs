use serde::{Deserialize, Serialize};
use std::hash::Hash as StdHash;

pub type Hash = [u8; 32];
pub type PubKeyHash = [u8; 20];

/// Identifier the transport layer assigns to a connected peer.
pub type PeerId = u64;

pub mod masternode;

/// Represents a reference to a specific transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, StdHash, Serialize, Deserialize)]
pub struct OutPoint {
    /// The transaction ID (hash) of the transaction containing the output.
    pub txid: [u8; 32],
    /// The index of the output within that transaction.
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: [u8; 32], vout: u32) -> Self {
        OutPoint { txid, vout }
    }

    /// Short human readable form (`<txid>-<vout>`) used in signed legacy messages.
    pub fn to_short_string(&self) -> String {
        format!("{}-{}", hex::encode(self.txid), self.vout)
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", hex::encode(self.txid), self.vout)
    }
}

/// Represents a transaction output, specifying a value and a locking script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// The value of the output in satoshis.
    pub value: u64,
    /// The locking script (scriptPubKey) that defines the conditions for spending this output.
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    /// Creates a new `TxOutput`.
    ///
    /// # Arguments
    /// * `value` - The value of the output in satoshis
    /// * `script_pubkey` - The locking script that defines spending conditions
    pub fn new(value: u64, script_pubkey: Vec<u8>) -> Self {
        TxOutput { value, script_pubkey }
    }

    /// Builds a standard pay-to-public-key-hash locking script.
    pub fn p2pkh_script(pubkey_hash: &PubKeyHash) -> Vec<u8> {
        let mut script = Vec::with_capacity(25);
        script.push(0x76); // OP_DUP
        script.push(0xA9); // OP_HASH160
        script.push(0x14); // PUSHDATA(20)
        script.extend_from_slice(pubkey_hash);
        script.push(0x88); // OP_EQUALVERIFY
        script.push(0xAC); // OP_CHECKSIG
        script
    }

    /// Extracts the public key hash from a P2PKH script, if applicable.
    pub fn extract_public_key_hash(&self) -> Option<PubKeyHash> {
        // P2PKH script: OP_DUP OP_HASH160 <20-byte-hash> OP_EQUALVERIFY OP_CHECKSIG
        // The public key hash is bytes 3 to 22
        if self.script_pubkey.len() == 25
            && self.script_pubkey[0] == 0x76 // OP_DUP
            && self.script_pubkey[1] == 0xA9 // OP_HASH160
            && self.script_pubkey[2] == 0x14 // PUSHDATA(20)
            && self.script_pubkey[23] == 0x88 // OP_EQUALVERIFY
            && self.script_pubkey[24] == 0xAC // OP_CHECKSIG
        {
            let mut public_key_hash = [0u8; 20];
            public_key_hash.copy_from_slice(&self.script_pubkey[3..23]);
            Some(public_key_hash)
        } else {
            None
        }
    }
}
