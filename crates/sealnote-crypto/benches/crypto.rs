use sealnote_crypto::{
    create_wrapped_dek, decrypt_json, encrypt_json, generate_dek, import_dek, unwrap_dek,
};
use secrecy::SecretString;

fn make_note(size: usize) -> serde_json::Value {
    let body: String = (0..size).map(|i| (b'a' + (i % 26) as u8) as char).collect();
    serde_json::json!({ "title": "bench", "body": body })
}

#[divan::bench(args = [256, 4096, 65536])]
fn bench_encrypt_json(bencher: divan::Bencher, size: usize) {
    let key = import_dek(generate_dek());
    let note = make_note(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| encrypt_json(divan::black_box(&key), divan::black_box(&note)).unwrap());
}

#[divan::bench(args = [256, 4096, 65536])]
fn bench_decrypt_json(bencher: divan::Bencher, size: usize) {
    let key = import_dek(generate_dek());
    let enc = encrypt_json(&key, &make_note(size)).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            decrypt_json::<serde_json::Value>(
                divan::black_box(&key),
                &enc.payload_iv,
                &enc.payload_ciphertext,
            )
            .unwrap()
        });
}

/// Full production-cost unlock (250k PBKDF2 iterations).
#[divan::bench(sample_count = 5)]
fn bench_unwrap_dek(bencher: divan::Bencher) {
    let pass = SecretString::from("benchmark passphrase");
    let (wrapped, _) = create_wrapped_dek(&pass).unwrap();
    bencher.bench(|| unwrap_dek(divan::black_box(&pass), divan::black_box(&wrapped)).unwrap());
}

fn main() {
    divan::main();
}
