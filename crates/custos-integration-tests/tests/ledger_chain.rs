//! Hash chain, signature and sequencing properties of the audit ledger.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use common::{LedgerFixture, actor, daytime};
use custos_audit::{AuditError, AuditStorage, ChainIssue};
use custos_crypto::{ContentHash, SigningKey};

#[test]
fn test_every_entry_links_to_its_predecessor() {
    let fx = LedgerFixture::new();
    for i in 0..20 {
        fx.ledger
            .append(daytime(&format!("coach-{}", i % 3), &format!("session.view.{i}")))
            .unwrap();
    }

    let first = fx.ledger.get(1).unwrap();
    assert!(first.previous_hash.is_zero());
    for seq in 2..=20 {
        let prev = fx.ledger.get(seq - 1).unwrap();
        let entry = fx.ledger.get(seq).unwrap();
        assert_eq!(entry.previous_hash, prev.integrity_hash, "link broken at {seq}");
        assert_eq!(entry.compute_hash().unwrap(), entry.integrity_hash);
        entry.verify_signature(&fx.key).unwrap();
    }

    let report = fx.ledger.verify_range(1, 20).unwrap();
    assert!(report.is_valid);
    assert_eq!(report.entries_verified, 20);
    assert_eq!(report.signatures_checked, 20);
}

#[test]
fn test_concurrent_threads_produce_gapless_sequence() {
    let fx = LedgerFixture::new();
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let ledger = Arc::clone(&fx.ledger);
            std::thread::spawn(move || {
                (0..20)
                    .map(|i| {
                        ledger
                            .append(daytime(&format!("worker-{t}"), &format!("record.write.{i}")))
                            .unwrap()
                            .sequence_number
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let seqs: BTreeSet<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(seqs, (1..=160).collect::<BTreeSet<u64>>());
    assert!(fx.ledger.verify_range(1, 160).unwrap().is_valid);
}

#[test]
fn test_five_concurrent_appends_for_one_actor() {
    let fx = LedgerFixture::new();
    for i in 0..7 {
        fx.ledger.append(daytime("admin", &format!("warmup.{i}"))).unwrap();
    }
    let n = fx.ledger.count().unwrap();

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let ledger = Arc::clone(&fx.ledger);
            std::thread::spawn(move || {
                ledger
                    .append(daytime("coach-9", &format!("reflection.create.{i}")))
                    .unwrap()
                    .sequence_number
            })
        })
        .collect();
    let seqs: BTreeSet<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(seqs, (n + 1..=n + 5).collect::<BTreeSet<u64>>());
}

#[test]
fn test_mutating_a_historical_field_breaks_the_chain_there() {
    let fx = LedgerFixture::new();
    for i in 0..6 {
        fx.ledger.append(daytime("coach-1", &format!("note.read.{i}"))).unwrap();
    }

    let mut entry = fx.ledger.get(4).unwrap();
    entry.risk_score = 0;
    entry.actor = actor("someone-else");
    fx.overwrite(&entry);

    let report = fx.ledger.verify_range(1, 6).unwrap();
    assert!(!report.is_valid);
    assert_eq!(report.broken_chain_at, Some(4));
    assert!(report.issues.contains(&ChainIssue::HashMismatch { sequence: 4 }));
    assert!(fx.ledger.is_under_investigation().unwrap());

    assert!(matches!(
        report.into_result(),
        Err(AuditError::ChainIntegrityViolation { sequence: 4, .. })
    ));
}

#[test]
fn test_signature_fails_when_signature_or_hash_altered() {
    let fx = LedgerFixture::new();
    let entry = fx.ledger.append(daytime("coach-2", "payment.view")).unwrap();
    entry.verify_signature(&fx.key).unwrap();

    let mut forged_sig = entry.clone();
    forged_sig.digital_signature = SigningKey::generate().sign(entry.integrity_hash.as_bytes());
    assert!(forged_sig.verify_signature(&fx.key).is_err());

    let mut forged_hash = entry.clone();
    forged_hash.integrity_hash = ContentHash::hash(b"forged");
    assert!(forged_hash.verify_signature(&fx.key).is_err());

    // Another key cannot vouch for a genuine entry either.
    assert!(entry.verify_signature(&SigningKey::generate()).is_err());

    fx.overwrite(&forged_sig);
    let report = fx.ledger.verify_range(1, 1).unwrap();
    assert!(report.issues.contains(&ChainIssue::InvalidSignature { sequence: 1 }));
}

#[test]
fn test_history_cannot_be_rewritten_through_storage() {
    let fx = LedgerFixture::new();
    let entry = fx.ledger.append(daytime("coach-4", "consent.view")).unwrap();

    assert!(matches!(
        fx.storage.put_entry(&entry),
        Err(AuditError::EntryAlreadyExists { sequence: 1 })
    ));
}
