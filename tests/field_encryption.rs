use std::sync::{Arc, Mutex};

use kyc_kernel::{
    decrypt_file, decrypt_pii, detect_pii, encrypt_file, encrypt_pii, mask, FieldType, KycError,
    Result,
};

#[tokio::test]
async fn seals_and_opens_every_field_type() -> Result<()> {
    let samples = [
        (FieldType::FullName, "Jane Q Doe"),
        (FieldType::DateOfBirth, "1990-04-12"),
        (FieldType::Ssn, "123-45-6789"),
        (FieldType::TaxId, "98-7654321"),
        (FieldType::Address, "42 Harbor Lane, Springfield"),
        (FieldType::Phone, "555-867-5309"),
        (FieldType::Email, "jane@example.com"),
        (FieldType::BankAccount, "000123456789"),
        (FieldType::Document, "passport:X1234567"),
    ];
    for (field_type, value) in samples {
        let sealed = encrypt_pii(value, field_type, "pw").await?;
        assert_eq!(sealed.algorithm_version, 1);
        let opened = decrypt_pii(&sealed, "pw").await?;
        assert_eq!(opened, value, "{}", field_type);
    }
    Ok(())
}

#[tokio::test]
async fn wrong_passphrase_never_yields_plaintext() -> Result<()> {
    let sealed = encrypt_pii("123-45-6789", FieldType::Ssn, "pw").await?;
    assert!(matches!(
        decrypt_pii(&sealed, "pW").await,
        Err(KycError::Decryption)
    ));
    Ok(())
}

#[tokio::test]
async fn invalid_value_is_rejected_before_any_crypto() {
    let err = encrypt_pii("not an email", FieldType::Email, "pw")
        .await
        .unwrap_err();
    match err {
        KycError::Validation { field_type, .. } => assert_eq!(field_type, FieldType::Email),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn same_value_encrypts_to_different_ciphertexts() -> Result<()> {
    let a = encrypt_pii("jane@example.com", FieldType::Email, "pw").await?;
    let b = encrypt_pii("jane@example.com", FieldType::Email, "pw").await?;
    assert_ne!(a.salt, b.salt);
    assert_ne!(a.iv, b.iv);
    assert_ne!(a.ciphertext, b.ciphertext);
    Ok(())
}

#[test]
fn masked_values_no_longer_detect_as_pii() {
    let samples = [
        (FieldType::Ssn, "123-45-6789"),
        (FieldType::Email, "jane@example.com"),
        (FieldType::Phone, "555-867-5309"),
        (FieldType::BankAccount, "000123456789"),
        (FieldType::DateOfBirth, "1990-04-12"),
    ];
    for (field_type, value) in samples {
        assert_eq!(detect_pii(value), Some(field_type), "{}", value);
        let masked = mask(value, field_type);
        assert_eq!(detect_pii(&masked), None, "{}", masked);
        // Masking is idempotent.
        assert_eq!(mask(&masked, field_type), masked);
    }
}

#[tokio::test]
async fn document_round_trips_with_progress() -> Result<()> {
    let bytes: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let ticks = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&ticks);

    let sealed = encrypt_file("statement.pdf", bytes.clone(), "pw", move |pct| {
        sink.lock().unwrap().push(pct);
    })
    .await?;
    assert_eq!(sealed.metadata.original_name, "statement.pdf");
    assert_ne!(sealed.metadata.storage_name, "statement.pdf.enc");

    let ticks = ticks.lock().unwrap();
    assert!(ticks.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*ticks.last().unwrap(), 100);
    drop(ticks);

    assert_eq!(decrypt_file(&sealed, "pw").await?, bytes);
    assert!(matches!(
        decrypt_file(&sealed, "other").await,
        Err(KycError::Decryption)
    ));
    Ok(())
}

#[tokio::test]
async fn serialized_ciphertext_survives_transport() -> Result<()> {
    let sealed = encrypt_pii("555-867-5309", FieldType::Phone, "pw").await?;
    let wire = serde_json::to_string(&sealed).unwrap();
    // Hex-encoded fields, no raw bytes on the wire.
    assert!(wire.contains("\"ciphertext\""));
    let parsed: kyc_kernel::EncryptionResult = serde_json::from_str(&wire).unwrap();
    assert_eq!(decrypt_pii(&parsed, "pw").await?, "555-867-5309");
    Ok(())
}
