use attack_sim::bignum::parse_decimal;
use attack_sim::scheduler::{Error, TaskStatus};
use attack_sim::simulation::Registry;
use num::bigint::BigUint;
use num::{Integer, One};
use serde_json::{json, Value};

use crate::common;

fn decimal(v: &Value) -> BigUint {
    parse_decimal(v.as_str().unwrap()).unwrap()
}

#[test]
fn test_hastad_small_message() {
    let scheduler = common::scheduler(1);

    let id = scheduler
        .submit(
            "hastad-attack",
            &json!({ "exponent": 3, "key_size_bits": 512, "message": 42 }),
        )
        .unwrap();

    let task = common::finish(&scheduler, &id);
    assert_eq!(task.status, TaskStatus::Completed);

    let result = scheduler.get_result(&id).unwrap();
    let out = &result.primary_output;

    assert_eq!(out["recovered_message"], "42");
    assert_eq!(out["original_message"], "42");
    assert_eq!(out["success"], true);
    assert_eq!(out["recipients"].as_array().unwrap().len(), 3);
    assert_eq!(out["ciphertexts"].as_array().unwrap().len(), 3);
}

#[test]
fn test_hastad_recipients() {
    let registry = Registry::builtin();
    let sim = registry.get("hastad-attack").unwrap();

    for e in [3_u32, 5, 7] {
        let result = sim.run(&json!({ "exponent": e, "key_size_bits": 256 })).unwrap();
        let out = &result.primary_output;
        assert_eq!(out["success"], true, "e = {}", e);

        let message = decimal(&out["original_message"]);
        let recipients = out["recipients"].as_array().unwrap();
        let ciphertexts = out["ciphertexts"].as_array().unwrap();
        assert_eq!(recipients.len(), e as usize);

        let moduli: Vec<BigUint> = recipients.iter().map(|r| decimal(&r["n"])).collect();

        for (i, (r, c)) in recipients.iter().zip(ciphertexts.iter()).enumerate() {
            assert_eq!(r["index"], i + 1);

            let (p, q, n, d) = (decimal(&r["p"]), decimal(&r["q"]), decimal(&r["n"]), decimal(&r["d"]));
            assert_eq!(&p * &q, n);
            assert_eq!(n.bits(), 256);
            assert!(message < n);
            assert_eq!(decimal(c).modpow(&d, &n), message);
        }

        // CRT needs pairwise coprime moduli
        for i in 0..moduli.len() {
            for j in i + 1..moduli.len() {
                assert!(moduli[i].gcd(&moduli[j]).is_one());
            }
        }
    }
}

#[test]
fn test_hastad_large_message() {
    let registry = Registry::builtin();
    let sim = registry.get("hastad-attack").unwrap();

    // largest accepted message for 512-bit moduli
    let message = (BigUint::one() << 510_u32) - BigUint::one();
    let result = sim
        .run(&json!({ "key_size_bits": 512, "message": message.to_str_radix(10) }))
        .unwrap();

    assert_eq!(result.primary_output["success"], true);
    assert_eq!(decimal(&result.primary_output["recovered_message"]), message);
    assert_eq!(result.visualization_data["root_exact"], true);
}

#[test]
fn test_hastad_invalid_parameters() {
    let scheduler = common::scheduler(1);

    match scheduler.submit("hastad-attack", &json!({ "exponent": 2 })) {
        Err(Error::InvalidParameters(errs)) => {
            assert_eq!(errs.fields().collect::<Vec<_>>(), vec!["exponent"]);
        }
        other => panic!("expected invalid parameters, got {:?}", other),
    }

    let too_big = (BigUint::one() << 600_u32).to_str_radix(10);
    assert!(matches!(
        scheduler.submit("hastad-attack", &json!({ "key_size_bits": 512, "message": too_big })),
        Err(Error::InvalidParameters(_))
    ));
    assert!(scheduler.store().is_empty());
}

#[test]
fn test_hastad_step_trace() {
    let registry = Registry::builtin();
    let sim = registry.get("hastad-attack").unwrap();
    let result = sim.run(&json!({ "exponent": 3, "key_size_bits": 256, "message": "7" })).unwrap();

    let labels: Vec<&str> = result.steps.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "Generating RSA key pairs",
            "Key pair 1 generated",
            "Key pair 2 generated",
            "Key pair 3 generated",
            "Message preparation",
            "Encryption for recipient 1",
            "Encryption for recipient 2",
            "Encryption for recipient 3",
            "Applying Chinese Remainder Theorem",
            "CRT Result",
            "Computing e-th root",
            "Attack result",
        ]
    );

    // the CRT value is exactly m^e
    let crt = result
        .steps
        .iter()
        .find(|s| s.label == "CRT Result")
        .unwrap();
    assert_eq!(crt.payload["value"], "343");
}
