//! Håstad's broadcast attack
//!
//! The same message is encrypted with a small public exponent e to e
//! recipients. CRT over the pairwise coprime moduli gives m^e exactly, and
//! an integer e-th root gives back m.

use num::bigint::{BigUint, RandBigInt};
use num::{Integer, One};
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::bignum::{self, crt, nth_root};
use crate::rsa::{self, RecipientKey};

use super::params::ParamReader;
use super::{
    Error, FieldErrors, ParameterKind, ParameterSpec, RunContext, SimulationResult, Simulator,
    SimulatorInfo,
};

pub const ID: &str = "hastad-attack";

pub const DEFAULT_EXPONENT: u32 = 3;
pub const MIN_EXPONENT: u32 = 3;
pub const MAX_EXPONENT: u32 = 17;

pub const DEFAULT_KEY_SIZE: u64 = 512;
pub const MIN_KEY_SIZE: u64 = 256;
pub const MAX_KEY_SIZE: u64 = 4096;

/// Key generation attempts per recipient before giving up
pub const DEFAULT_MAX_KEYGEN_ATTEMPTS: usize = 16;

const FIELDS: [&str; 3] = ["exponent", "key_size_bits", "message"];

/// Validated Håstad parameters
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HastadParams {
    pub exponent: u32,
    pub key_size_bits: u64,
    #[serde(serialize_with = "bignum::serialize_decimal_opt")]
    pub message: Option<BigUint>,
}

/// Primary output of a Håstad run
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HastadReport {
    #[serde(serialize_with = "bignum::serialize_decimal")]
    pub original_message: BigUint,
    #[serde(serialize_with = "bignum::serialize_decimal")]
    pub recovered_message: BigUint,
    pub success: bool,
    pub exponent: u32,
    pub key_size_bits: u64,
    pub recipients: Vec<RecipientKey>,
    #[serde(serialize_with = "bignum::serialize_decimal_seq")]
    pub ciphertexts: Vec<BigUint>,
}

/// Håstad broadcast attack simulator
#[derive(Clone, Debug)]
pub struct HastadBroadcast {
    max_keygen_attempts: usize,
}

impl Default for HastadBroadcast {
    fn default() -> Self {
        Self {
            max_keygen_attempts: DEFAULT_MAX_KEYGEN_ATTEMPTS,
        }
    }
}

impl HastadBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of key generation attempts per recipient (at least one)
    pub fn with_max_keygen_attempts(mut self, attempts: usize) -> Self {
        self.max_keygen_attempts = attempts.max(1);
        self
    }

    pub fn max_keygen_attempts(&self) -> usize {
        self.max_keygen_attempts
    }

    /// Generate `exponent` key pairs with pairwise coprime moduli
    ///
    /// `next_pair` yields candidate prime pairs. A candidate is rejected when
    /// its primes repeat, when e has no inverse mod phi(n), or when the modulus
    /// shares a factor with an earlier recipient.
    ///
    /// errors: ModulusCollision when a recipient kept colliding with earlier
    /// moduli, KeyGeneration when candidates were unusable for other reasons
    fn generate_keys<F>(
        &self,
        exponent: u32,
        ctx: &mut RunContext<'_>,
        mut next_pair: F,
    ) -> Result<Vec<RecipientKey>, Error>
    where
        F: FnMut(&RunContext<'_>) -> Result<(BigUint, BigUint), Error>,
    {
        let e = BigUint::from(exponent);
        let count = exponent as usize;
        let mut keys: Vec<RecipientKey> = Vec::with_capacity(count);

        for index in 1..=count {
            let mut collisions = 0;
            let mut accepted = None;

            for attempt in 1..=self.max_keygen_attempts {
                ctx.checkpoint()?;

                let (p, q) = next_pair(&*ctx)?;
                let key = match RecipientKey::from_primes(index, p, q, &e) {
                    Ok(key) => key,
                    Err(rsa::Error::Arithmetic(err)) => return Err(err.into()),
                    Err(err) => {
                        debug!(recipient = index, attempt, %err, "Rejected prime pair");
                        continue;
                    }
                };

                if keys.iter().any(|k| key.shares_factor(&k.n)) {
                    collisions += 1;
                    warn!(
                        recipient = index,
                        attempt, "Modulus shares a factor with an earlier recipient"
                    );
                    continue;
                }

                accepted = Some((key, attempt));
                break;
            }

            let (key, attempts) = match accepted {
                Some(found) => found,
                None if collisions > 0 => {
                    return Err(Error::ModulusCollision {
                        attempts: self.max_keygen_attempts,
                    })
                }
                None => {
                    return Err(Error::KeyGeneration {
                        attempts: self.max_keygen_attempts,
                    })
                }
            };

            ctx.record(
                format!("Key pair {index} generated"),
                format!("Recipient {index} modulus (n{index}): {}", key.n),
                json!({
                    "recipient": serde_json::to_value(&key)?,
                    "modulus_bits": key.n.bits(),
                    "attempts": attempts,
                }),
            );
            ctx.progress(
                (5 + 55 * index / count) as u8,
                &format!("Generated key pair {index} of {count}"),
            );

            keys.push(key);
        }

        Ok(keys)
    }

    fn run_with<R, F>(
        &self,
        params: &HastadParams,
        ctx: &mut RunContext<'_>,
        rng: &mut R,
        next_pair: F,
    ) -> Result<SimulationResult, Error>
    where
        R: Rng + ?Sized,
        F: FnMut(&RunContext<'_>) -> Result<(BigUint, BigUint), Error>,
    {
        let e = params.exponent;
        let key_size_bits = params.key_size_bits;

        info!(exponent = e, key_size_bits, "Starting Håstad broadcast attack");

        ctx.progress(0, "Generating RSA key pairs");
        ctx.record(
            "Generating RSA key pairs",
            format!("Creating {e} RSA key pairs with e={e}"),
            json!({ "exponent": e, "key_size_bits": key_size_bits, "recipients": e }),
        );

        let keys = self.generate_keys(e, ctx, next_pair)?;

        let (message, generated) = match &params.message {
            Some(m) => (m.clone(), false),
            None => {
                let min_n = keys
                    .iter()
                    .map(|k| &k.n)
                    .min()
                    .ok_or(Error::KeyGeneration { attempts: 0 })?;
                let low = BigUint::one() << (key_size_bits / 2);
                (rng.gen_biguint_range(&low, min_n), true)
            }
        };

        ctx.record(
            "Message preparation",
            format!("Original message: {message}"),
            json!({
                "message": message.to_str_radix(10),
                "message_bits": message.bits(),
                "generated": generated,
            }),
        );

        let mut ciphertexts = Vec::with_capacity(keys.len());
        for key in keys.iter() {
            ctx.checkpoint()?;

            let c = key.encrypt(&message);
            ctx.record(
                format!("Encryption for recipient {}", key.index),
                format!("C{i} = M^{e} mod N{i} = {c}", i = key.index),
                json!({
                    "recipient": key.index,
                    "modulus": key.n.to_str_radix(10),
                    "ciphertext": c.to_str_radix(10),
                }),
            );
            ciphertexts.push(c);
        }
        ctx.progress(70, "Encrypted the message for every recipient");

        ctx.checkpoint()?;
        let moduli: Vec<BigUint> = keys.iter().map(|k| k.n.clone()).collect();

        ctx.record(
            "Applying Chinese Remainder Theorem",
            format!("Using CRT to find M^{e} mod (N1 x N2 x ... x N{e})"),
            json!({ "congruences": ciphertexts.len() }),
        );
        let (x, product) = crt(&ciphertexts, &moduli)?;
        ctx.record(
            "CRT Result",
            format!("M^{e} mod (N1 x N2 x ... x N{e}) = {x}"),
            json!({
                "value": x.to_str_radix(10),
                "value_bits": x.bits(),
                "product_bits": product.bits(),
            }),
        );
        ctx.progress(85, "Solved the CRT system");

        ctx.checkpoint()?;
        ctx.record(
            "Computing e-th root",
            format!("Taking the {e}-th root of {x}"),
            json!({ "exponent": e }),
        );
        let recovered = extract_root(&x, e)?;
        ctx.progress(95, "Extracted the e-th root");

        let success = recovered == message;
        ctx.record(
            "Attack result",
            format!(
                "Recovered message: {recovered}\nOriginal message: {message}\nAttack successful: {success}"
            ),
            json!({
                "recovered_message": recovered.to_str_radix(10),
                "original_message": message.to_str_radix(10),
                "success": success,
            }),
        );

        info!(exponent = e, success, "Håstad broadcast attack finished");

        let visualization_data = json!({
            "exponent": e,
            "moduli_bits": moduli.iter().map(|n| n.bits()).collect::<Vec<_>>(),
            "crt_bits": x.bits(),
            "product_bits": product.bits(),
            "root_exact": true,
        });

        let report = HastadReport {
            original_message: message,
            recovered_message: recovered,
            success,
            exponent: e,
            key_size_bits,
            recipients: keys,
            ciphertexts,
        };

        Ok(SimulationResult {
            primary_output: serde_json::to_value(&report)?,
            steps: ctx.take_steps(),
            visualization_data,
        })
    }
}

/// Exact integer e-th root of a CRT value
///
/// errors: RootExtractionFailed when x is not a perfect e-th power
pub fn extract_root(x: &BigUint, exponent: u32) -> Result<BigUint, Error> {
    match nth_root(x, exponent)? {
        (root, true) => Ok(root),
        (_, false) => Err(Error::RootExtractionFailed { exponent }),
    }
}

impl Simulator for HastadBroadcast {
    type Params = HastadParams;

    fn info(&self) -> SimulatorInfo {
        SimulatorInfo {
            id: ID,
            name: "Håstad's Broadcast Attack",
            description: "A cryptographic attack on RSA when the same message is encrypted with the same low exponent to multiple recipients.",
            complexity: "Medium",
            tags: vec!["RSA", "Cryptography", "Number Theory", "CRT"],
            parameter_schema: vec![
                ParameterSpec {
                    name: "exponent",
                    kind: ParameterKind::Integer,
                    required: false,
                    default: Some(json!(DEFAULT_EXPONENT)),
                    description: "Public exponent e shared by all recipients, odd, 3 to 17. One recipient is generated per unit of e.",
                },
                ParameterSpec {
                    name: "key_size_bits",
                    kind: ParameterKind::Integer,
                    required: false,
                    default: Some(json!(DEFAULT_KEY_SIZE)),
                    description: "RSA modulus size in bits, 256 to 4096, multiple of 16",
                },
                ParameterSpec {
                    name: "message",
                    kind: ParameterKind::BigInteger,
                    required: false,
                    default: None,
                    description: "Message to broadcast, smaller than every modulus. Random when absent.",
                },
            ],
        }
    }

    fn validate(&self, raw: &Value) -> Result<HastadParams, FieldErrors> {
        let mut reader = ParamReader::new(raw);

        let exponent = reader.u64_or("exponent", DEFAULT_EXPONENT as u64);
        if exponent < MIN_EXPONENT as u64 {
            reader.reject(
                "exponent",
                format!("insufficient recipients: CRT recovery needs e >= {MIN_EXPONENT}"),
            );
        } else if exponent > MAX_EXPONENT as u64 {
            reader.reject("exponent", format!("must be at most {MAX_EXPONENT}"));
        } else if exponent.is_even() {
            reader.reject("exponent", "must be odd");
        }

        let key_size_bits = reader.u64_or("key_size_bits", DEFAULT_KEY_SIZE);
        let key_size_ok = (MIN_KEY_SIZE..=MAX_KEY_SIZE).contains(&key_size_bits) && key_size_bits % 16 == 0;
        if !key_size_ok {
            reader.reject(
                "key_size_bits",
                format!("must be a multiple of 16 between {MIN_KEY_SIZE} and {MAX_KEY_SIZE}"),
            );
        }

        let message = reader.opt_biguint("message");
        if let Some(m) = &message {
            if key_size_ok && m.bits() >= key_size_bits - 1 {
                reader.reject(
                    "message",
                    format!("must have fewer than {} bits to fit below every modulus", key_size_bits - 1),
                );
            }
        }

        reader.reject_unknown(&FIELDS);

        reader.finish(HastadParams {
            exponent: exponent as u32,
            key_size_bits,
            message,
        })
    }

    fn execute(&self, params: &HastadParams, ctx: &mut RunContext<'_>) -> Result<SimulationResult, Error> {
        let mut rng = rand::thread_rng();
        let mut prime_rng = rand::thread_rng();

        let e = BigUint::from(params.exponent);
        let modulus_bits = params.key_size_bits;

        self.run_with(params, ctx, &mut rng, |ctx| {
            ctx.checkpoint()?;
            rsa::gen_prime_pair(&mut prime_rng, modulus_bits, &e).map_err(|err| match err {
                rsa::Error::Arithmetic(err) => err.into(),
                _ => Error::KeyGeneration { attempts: 1 },
            })
        })
    }
}
