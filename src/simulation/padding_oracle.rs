//! CBC padding oracle attack
//!
//! A message is padded and CBC-encrypted under a fresh AES key. The attack
//! then recovers the selected blocks one byte at a time, asking a keyed
//! oracle nothing but whether a crafted ciphertext decrypts to valid padding.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::cbc::{self, BlockCipher, BLOCK_LEN, KEY_SIZES};
use crate::oracle::{
    self, gen_rand_iv, gen_rand_key, recover_intermediate, strip_recovered_padding, AttackEvent,
    CbcPaddingOracle,
};
use crate::{bytes, encoding, pkcs7};

use super::params::ParamReader;
use super::{
    Error, FieldErrors, ParameterKind, ParameterSpec, RunContext, SimulationResult, Simulator,
    SimulatorInfo,
};

pub const ID: &str = "cbc-padding-oracle";

pub const DEFAULT_MESSAGE: &str =
    "This is a secret message that will be decrypted by the padding oracle attack.";

pub const DEFAULT_KEY_SIZE: usize = 128;

const FIELDS: [&str; 4] = ["message", "key_size_bits", "auto_decrypt", "target_blocks"];

/// Validated padding oracle parameters
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaddingOracleParams {
    pub message: String,
    pub key_size_bits: usize,
    pub auto_decrypt: bool,
    /// Blocks to attack, ascending, already checked against the ciphertext length
    pub target_blocks: Vec<usize>,
}

impl PaddingOracleParams {
    /// Number of ciphertext blocks the padded message occupies
    pub fn block_count(&self) -> usize {
        block_count(self.message.len())
    }
}

fn block_count(message_len: usize) -> usize {
    message_len / BLOCK_LEN + 1
}

/// One ciphertext block and its recovery state
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CipherBlock {
    pub index: usize,
    #[serde(serialize_with = "encoding::serialize_base64")]
    pub bytes: Vec<u8>,
    pub decrypted: bool,
    #[serde(serialize_with = "encoding::serialize_base64_opt")]
    pub decrypted_bytes: Option<Vec<u8>>,
}

/// Plaintext recovered for one block
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecryptedBlock {
    pub block_index: usize,
    #[serde(serialize_with = "encoding::serialize_hex")]
    pub decrypted_hex: Vec<u8>,
    pub decrypted_text: String,
}

/// Primary output of a padding oracle run
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaddingOracleReport {
    pub original_message: String,
    #[serde(serialize_with = "encoding::serialize_base64")]
    pub encrypted_message: Vec<u8>,
    #[serde(serialize_with = "encoding::serialize_base64")]
    pub iv: Vec<u8>,
    pub blocks: Vec<CipherBlock>,
    pub decrypted_blocks: Vec<DecryptedBlock>,
    /// Unpadded plaintext, present once every block was recovered
    pub recovered_message: Option<String>,
    pub oracle_queries: u64,
    pub success: bool,
}

/// CBC padding oracle attack simulator
#[derive(Clone, Debug, Default)]
pub struct CbcPaddingOracleSimulator;

impl CbcPaddingOracleSimulator {
    pub fn new() -> Self {
        Self
    }
}

impl Simulator for CbcPaddingOracleSimulator {
    type Params = PaddingOracleParams;

    fn info(&self) -> SimulatorInfo {
        SimulatorInfo {
            id: ID,
            name: "CBC Padding Oracle Attack",
            description: "Explore how padding oracle vulnerabilities can be exploited to decrypt CBC mode ciphertexts without knowing the key.",
            complexity: "Hard",
            tags: vec!["AES", "Block Cipher", "Oracle Attack", "Padding"],
            parameter_schema: vec![
                ParameterSpec {
                    name: "message",
                    kind: ParameterKind::String,
                    required: false,
                    default: Some(json!(DEFAULT_MESSAGE)),
                    description: "Plaintext to encrypt and recover",
                },
                ParameterSpec {
                    name: "key_size_bits",
                    kind: ParameterKind::Integer,
                    required: false,
                    default: Some(json!(DEFAULT_KEY_SIZE)),
                    description: "AES key size: 128, 192 or 256",
                },
                ParameterSpec {
                    name: "auto_decrypt",
                    kind: ParameterKind::Boolean,
                    required: false,
                    default: Some(json!(true)),
                    description: "Attack every block. When false only target_blocks are attacked.",
                },
                ParameterSpec {
                    name: "target_blocks",
                    kind: ParameterKind::IntegerList,
                    required: false,
                    default: None,
                    description: "Block indices to attack when auto_decrypt is false. Out of range indices are ignored, block 0 is used when none remain.",
                },
            ],
        }
    }

    fn validate(&self, raw: &Value) -> Result<PaddingOracleParams, FieldErrors> {
        let mut reader = ParamReader::new(raw);

        let message = reader
            .opt_string("message")
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

        let key_size_bits = reader.u64_or("key_size_bits", DEFAULT_KEY_SIZE as u64) as usize;
        if !KEY_SIZES.contains(&key_size_bits) {
            reader.reject("key_size_bits", "must be one of 128, 192 or 256");
        }

        let auto_decrypt = reader.bool_or("auto_decrypt", true);
        let requested = reader.opt_index_list("target_blocks");

        reader.reject_unknown(&FIELDS);

        let count = block_count(message.len());
        let target_blocks = if auto_decrypt {
            (0..count).collect()
        } else {
            let mut selected: Vec<usize> = requested
                .unwrap_or_default()
                .into_iter()
                .filter(|&i| i < count)
                .collect();
            selected.sort_unstable();
            selected.dedup();
            if selected.is_empty() {
                selected.push(0);
            }
            selected
        };

        reader.finish(PaddingOracleParams {
            message,
            key_size_bits,
            auto_decrypt,
            target_blocks,
        })
    }

    fn execute(
        &self,
        params: &PaddingOracleParams,
        ctx: &mut RunContext<'_>,
    ) -> Result<SimulationResult, Error> {
        info!(
            key_size_bits = params.key_size_bits,
            message_len = params.message.len(),
            "Starting CBC padding oracle attack"
        );

        ctx.progress(0, "Initial setup");
        ctx.record(
            "Initial Setup",
            format!(
                "Message to encrypt: '{}'\nKey size: {} bits",
                params.message, params.key_size_bits
            ),
            json!({
                "message": params.message,
                "message_len": params.message.len(),
                "key_size_bits": params.key_size_bits,
                "block_len": BLOCK_LEN,
            }),
        );

        let mut rng = rand::thread_rng();
        let key = gen_rand_key(&mut rng, params.key_size_bits);
        let iv = gen_rand_iv(&mut rng);

        ctx.record(
            "Key and IV Generation",
            format!(
                "Generated AES key: {}\nGenerated IV: {}",
                encoding::to_base64(&key),
                encoding::to_base64(&iv)
            ),
            json!({ "key": encoding::to_base64(&key), "iv": encoding::to_base64(&iv) }),
        );

        let plaintext = pkcs7::pad(params.message.as_bytes(), BLOCK_LEN);
        let cipher = BlockCipher::new(&key)?;
        let ciphertext = cbc::encrypt(&cipher, &plaintext, &iv)?;

        ctx.record(
            "Encryption",
            format!(
                "Encrypted ciphertext: {}\nCiphertext length: {} bytes",
                encoding::to_base64(&ciphertext),
                ciphertext.len()
            ),
            json!({
                "ciphertext": encoding::to_base64(&ciphertext),
                "ciphertext_len": ciphertext.len(),
                "padding_len": plaintext.len() - params.message.len(),
            }),
        );

        let mut blocks: Vec<CipherBlock> = bytes::to_blocks(&ciphertext, BLOCK_LEN)
            .into_iter()
            .enumerate()
            .map(|(index, bytes)| CipherBlock {
                index,
                bytes,
                decrypted: false,
                decrypted_bytes: None,
            })
            .collect();
        let count = blocks.len();

        ctx.record(
            "Block Analysis",
            format!("Ciphertext split into {count} blocks of {BLOCK_LEN} bytes each"),
            json!({ "block_count": count, "block_len": BLOCK_LEN }),
        );

        let targets: Vec<usize> = params
            .target_blocks
            .iter()
            .rev()
            .copied()
            .filter(|&i| i < count)
            .collect();

        // the oracle only sees ciphertexts; the key stays inside it
        let service = CbcPaddingOracle::new(&key)?;
        let total_bytes = targets.len() * BLOCK_LEN;
        let mut solved_bytes = 0;
        let mut queries_per_block = Vec::with_capacity(targets.len());
        let mut decrypted_blocks = Vec::with_capacity(targets.len());

        for &idx in targets.iter() {
            ctx.checkpoint()?;

            let prev: &[u8] = if idx == 0 { &iv } else { &blocks[idx - 1].bytes };
            let prev = prev.to_vec();
            let target = blocks[idx].bytes.clone();

            ctx.record(
                format!("Attacking Block {idx}"),
                format!("Starting padding oracle attack on block {idx}"),
                json!({
                    "block_index": idx,
                    "previous_block": encoding::to_base64(&prev),
                    "previous_is_iv": idx == 0,
                }),
            );

            let before = service.query_count();
            let mut intermediate = recover_intermediate(&service, &prev, &target, |event| {
                match event {
                    AttackEvent::ByteStart { .. } => ctx.checkpoint(),
                    AttackEvent::ByteFound(found) => {
                        solved_bytes += 1;
                        ctx.record(
                            format!("Found byte at position {}", found.position),
                            format!(
                                "Found correct value for byte {}: {}. Decrypted intermediate byte: {}",
                                BLOCK_LEN - 1 - found.position,
                                found.guess,
                                found.intermediate
                            ),
                            json!({
                                "block_index": idx,
                                "position": found.position,
                                "padding": found.padding,
                                "guess": found.guess,
                                "intermediate": found.intermediate,
                                "false_positives": found.false_positives,
                                "queries": found.queries,
                            }),
                        );
                        ctx.progress(
                            (10 + 85 * solved_bytes / total_bytes) as u8,
                            &format!("Recovering block {idx}"),
                        );
                        Ok(())
                    }
                }
            })
            .map_err(|err| match err {
                Error::Oracle(oracle::Error::OracleExhausted { position }) => {
                    Error::OracleExhausted {
                        block: idx,
                        position,
                    }
                }
                err => err,
            })?;

            let block_queries = service.query_count() - before;
            queries_per_block.push(json!({ "block_index": idx, "queries": block_queries }));

            bytes::xor_assign(&mut intermediate, &prev);
            let recovered = intermediate;
            let text = String::from_utf8_lossy(&recovered).into_owned();

            ctx.record(
                format!("Block {idx} Decrypted"),
                format!(
                    "Successfully decrypted block {idx}:\nHex: {}\nText: {text}",
                    encoding::to_hex(&recovered)
                ),
                json!({
                    "block_index": idx,
                    "hex": encoding::to_hex(&recovered),
                    "text": text,
                    "oracle_queries": block_queries,
                }),
            );
            debug!(block = idx, queries = block_queries, "Recovered block");

            blocks[idx].decrypted = true;
            blocks[idx].decrypted_bytes = Some(recovered.clone());
            decrypted_blocks.push(DecryptedBlock {
                block_index: idx,
                decrypted_hex: recovered,
                decrypted_text: text,
            });
        }

        decrypted_blocks.sort_by_key(|b| b.block_index);

        let (recovered_message, success) = if decrypted_blocks.len() == count {
            let joined: Vec<u8> = decrypted_blocks
                .iter()
                .flat_map(|b| b.decrypted_hex.iter().copied())
                .collect();
            let unpadded = strip_recovered_padding(&joined, BLOCK_LEN).map_err(|err| match err {
                oracle::Error::InvalidPadding(value) => Error::InvalidPadding { value },
                err => err.into(),
            })?;
            let success = unpadded == params.message.as_bytes();
            let recovered = String::from_utf8_lossy(&unpadded).into_owned();

            ctx.record(
                "Attack Completed",
                format!(
                    "Actual plaintext: {}\nRecovered plaintext: {recovered}\nAttack successful: {success}",
                    params.message
                ),
                json!({ "recovered_message": recovered, "success": success }),
            );
            (Some(recovered), success)
        } else {
            let success = decrypted_blocks.iter().all(|b| {
                let start = b.block_index * BLOCK_LEN;
                plaintext.get(start..start + BLOCK_LEN) == Some(b.decrypted_hex.as_slice())
            });

            ctx.record(
                "Attack Completed",
                format!(
                    "Recovered {} of {count} blocks\nAttack successful: {success}",
                    decrypted_blocks.len()
                ),
                json!({ "blocks_recovered": decrypted_blocks.len(), "success": success }),
            );
            (None, success)
        };
        ctx.progress(95, "Attack completed");

        let oracle_queries = service.query_count();
        info!(
            blocks = decrypted_blocks.len(),
            oracle_queries, success, "CBC padding oracle attack finished"
        );

        let visualization_data = json!({
            "block_len": BLOCK_LEN,
            "block_count": count,
            "attack_order": targets,
            "oracle_queries": oracle_queries,
            "queries_per_block": queries_per_block,
        });

        let report = PaddingOracleReport {
            original_message: params.message.clone(),
            encrypted_message: ciphertext,
            iv: iv.to_vec(),
            blocks,
            decrypted_blocks,
            recovered_message,
            oracle_queries,
            success,
        };

        Ok(SimulationResult {
            primary_output: serde_json::to_value(&report)?,
            steps: ctx.take_steps(),
            visualization_data,
        })
    }
}
