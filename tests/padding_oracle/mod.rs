use attack_sim::cbc::{self, BlockCipher, BLOCK_LEN};
use attack_sim::encoding::from_base64;
use attack_sim::oracle::{decrypt_with_padding_oracle, gen_rand_iv, gen_rand_key, CbcPaddingOracle};
use attack_sim::pkcs7;
use attack_sim::scheduler::TaskStatus;
use attack_sim::simulation::Registry;
use rand::{thread_rng, Rng};
use serde_json::json;

use crate::common;

fn random_text(len: usize) -> String {
    let mut rng = thread_rng();
    (0..len).map(|_| rng.gen_range(b' '..=b'~') as char).collect()
}

#[test]
fn test_padding_oracle_round_trip() {
    let registry = Registry::builtin();
    let sim = registry.get("cbc-padding-oracle").unwrap();

    // 1 to 10 ciphertext blocks, block aligned lengths included
    for len in [1, 15, 16, 17, 32, 47, 64, 100, 128, 144] {
        let message = random_text(len);
        let result = sim.run(&json!({ "message": message })).unwrap();
        let out = &result.primary_output;

        let blocks = len / BLOCK_LEN + 1;
        assert_eq!(out["recovered_message"], message.as_str(), "len {}", len);
        assert_eq!(out["success"], true);
        assert_eq!(out["blocks"].as_array().unwrap().len(), blocks);
        assert_eq!(out["decrypted_blocks"].as_array().unwrap().len(), blocks);

        let ciphertext = from_base64(out["encrypted_message"].as_str().unwrap().as_bytes()).unwrap();
        assert_eq!(ciphertext.len(), blocks * BLOCK_LEN);
        assert_eq!(from_base64(out["iv"].as_str().unwrap().as_bytes()).unwrap().len(), BLOCK_LEN);
    }
}

#[test]
fn test_padding_oracle_block_aligned() {
    let registry = Registry::builtin();
    let sim = registry.get("cbc-padding-oracle").unwrap();

    let result = sim.run(&json!({ "message": "YELLOW SUBMARINE" })).unwrap();
    let out = &result.primary_output;

    // a full block of padding follows an aligned message
    assert_eq!(out["blocks"].as_array().unwrap().len(), 2);
    assert_eq!(out["decrypted_blocks"][1]["decrypted_hex"], "10".repeat(BLOCK_LEN));
    assert_eq!(out["decrypted_blocks"][0]["decrypted_text"], "YELLOW SUBMARINE");
    assert_eq!(out["recovered_message"], "YELLOW SUBMARINE");
}

#[test]
fn test_padding_oracle_empty_message() {
    let scheduler = common::scheduler(1);
    let id = scheduler
        .submit("cbc-padding-oracle", &json!({ "message": "", "auto_decrypt": true }))
        .unwrap();

    let task = common::finish(&scheduler, &id);
    assert_eq!(task.status, TaskStatus::Completed);

    let result = scheduler.get_result(&id).unwrap();
    let out = &result.primary_output;
    assert_eq!(out["blocks"].as_array().unwrap().len(), 1);
    assert_eq!(out["decrypted_blocks"].as_array().unwrap().len(), 1);
    assert_eq!(out["recovered_message"], "");
    assert_eq!(out["success"], true);
}

#[test]
fn test_padding_oracle_selected_blocks() {
    let registry = Registry::builtin();
    let sim = registry.get("cbc-padding-oracle").unwrap();

    let result = sim
        .run(&json!({ "auto_decrypt": false, "target_blocks": [3, 1, 99] }))
        .unwrap();
    let out = &result.primary_output;

    let decrypted: Vec<u64> = out["decrypted_blocks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["block_index"].as_u64().unwrap())
        .collect();
    assert_eq!(decrypted, vec![1, 3]);
    assert_eq!(out["recovered_message"], serde_json::Value::Null);
    assert_eq!(out["success"], true);
    assert_eq!(out["decrypted_blocks"][0]["decrypted_text"], " message that wi");
    assert_eq!(out["decrypted_blocks"][1]["decrypted_text"], "by the padding o");

    let flags: Vec<bool> = out["blocks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["decrypted"].as_bool().unwrap())
        .collect();
    assert_eq!(flags, vec![false, true, false, true, false]);

    let per_block = result.visualization_data["queries_per_block"].as_array().unwrap();
    assert_eq!(per_block.len(), 2);
}

#[test]
fn test_oracle_decrypt() {
    let mut rng = thread_rng();

    for key_bits in cbc::KEY_SIZES {
        let key = gen_rand_key(&mut rng, key_bits);
        let iv = gen_rand_iv(&mut rng);
        let cipher = BlockCipher::new(&key).unwrap();

        let plaintext = random_text(53);
        let ciphertext = cbc::encrypt(&cipher, &pkcs7::pad(plaintext.as_bytes(), BLOCK_LEN), &iv).unwrap();

        let oracle = CbcPaddingOracle::new(&key).unwrap();
        let recovered = decrypt_with_padding_oracle(&oracle, &iv, &ciphertext).unwrap();

        assert_eq!(recovered, plaintext.as_bytes());
        assert!(oracle.query_count() >= (ciphertext.len() as u64));
    }
}
