use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use fixedwire::schema::ecert::{EcertDetail, EcertFeedbackRecord, EcertFooter, EcertHeader};
use fixedwire::schema::msfaa::{MsfaaFooter, MsfaaHeader, MsfaaOutcome, MsfaaResponseRecord};
use fixedwire::schema::receipt::{ReceiptDetail, ReceiptFooter, ReceiptHeader};
use fixedwire::schema::restriction::{RestrictionDetail, RestrictionFooter, RestrictionHeader};
use fixedwire::schema::sin_validation::{SinFooter, SinHeader, SinResponseRecord};
use fixedwire::{
    BatchBuilder, Disbursement, DisbursementStatus, DocumentNumber, EnvironmentCode,
    FeedbackReconciler, FundingType, MemoryStorage, MockFileTransfer, Money, MsfaaAgreement,
    MsfaaStatus, OfferingIntensity, ReconcileOutcome, SequenceAllocator, Sin, SinCheck,
    SinCheckStatus,
};

fn sin(digits: &str) -> Sin {
    Sin::new(digits).expect("valid SIN")
}

fn disbursement(sin_digits: &str, last_name: &str) -> Disbursement {
    Disbursement {
        id: Uuid::new_v4(),
        intensity: OfferingIntensity::FullTime,
        sin: sin(sin_digits),
        institution_code: "AUBC".to_string(),
        award_amount: Money::from_minor(123456),
        disbursement_date: NaiveDate::from_ymd_opt(2025, 9, 1).expect("valid date"),
        student_last_name: last_name.to_string(),
        student_birth_date: NaiveDate::from_ymd_opt(2001, 4, 15).expect("valid date"),
        document_number: None,
        status: DisbursementStatus::Pending,
        feedback_errors: Vec::new(),
        receipted_amount: None,
        updated_at: Utc::now(),
    }
}

fn join(lines: Vec<String>) -> String {
    let mut body = lines.join("\n");
    body.push('\n');
    body
}

fn ecert_feedback_body(records: &[EcertFeedbackRecord]) -> String {
    let intensity = OfferingIntensity::FullTime;
    let header = EcertHeader {
        intensity,
        environment: 'P',
        created: NaiveDate::from_ymd_opt(2025, 9, 2)
            .expect("valid date")
            .and_hms_opt(8, 30, 0)
            .expect("valid time"),
        sequence: 1,
    };
    let footer = EcertFooter {
        intensity,
        record_count: records.len() as i64,
        total_amount: Money::ZERO,
        sin_hash_total: records.iter().map(|r| r.sin.value()).sum(),
    };
    let mut lines = vec![header.to_line().expect("header encodes")];
    for record in records {
        lines.push(record.to_line().expect("record encodes"));
    }
    lines.push(footer.to_line().expect("footer encodes"));
    join(lines)
}

fn harness() -> (
    Arc<MemoryStorage>,
    Arc<MockFileTransfer>,
    BatchBuilder<MemoryStorage, MockFileTransfer>,
    FeedbackReconciler<MemoryStorage, MockFileTransfer>,
) {
    let storage = Arc::new(MemoryStorage::new());
    let transfer = Arc::new(MockFileTransfer::new());
    let builder = BatchBuilder::new(
        storage.clone(),
        transfer.clone(),
        EnvironmentCode::Production,
    );
    let reconciler = FeedbackReconciler::new(storage.clone(), transfer.clone());
    (storage, transfer, builder, reconciler)
}

#[test_log::test(tokio::test)]
async fn full_ecert_cycle_applies_feedback_to_sent_disbursements() {
    let (storage, transfer, builder, reconciler) = harness();
    let a = disbursement("123456782", "SMITH");
    let b = disbursement("046454286", "NGUYEN");
    let (id_a, id_b) = (a.id, b.id);
    storage.insert_disbursement(a);
    storage.insert_disbursement(b);

    let output = builder
        .send_ecert(OfferingIntensity::FullTime)
        .await
        .expect("send should succeed")
        .expect("a batch should ship");
    assert_eq!(output.batch.record_count, 2);
    assert!(transfer.uploaded(&output.batch.file_name).is_some());

    // Shipped records carry their assigned document numbers.
    let doc_a = storage
        .disbursement(id_a)
        .and_then(|d| d.document_number)
        .expect("document number assigned");
    let doc_b = storage
        .disbursement(id_b)
        .and_then(|d| d.document_number)
        .expect("document number assigned");
    assert_ne!(doc_a, doc_b);

    let feedback = ecert_feedback_body(&[
        EcertFeedbackRecord {
            intensity: OfferingIntensity::FullTime,
            document_number: doc_a,
            sin: sin("123456782"),
            error_codes: Vec::new(),
        },
        EcertFeedbackRecord {
            intensity: OfferingIntensity::FullTime,
            document_number: doc_b,
            sin: sin("046454286"),
            error_codes: vec!["EDU-00123".to_string()],
        },
    ]);
    transfer.seed_inbound("PBC.EDU.ECERT.FT.FB.20250902.001", &feedback);

    let report = reconciler
        .process_file("PBC.EDU.ECERT.FT.FB.20250902.001")
        .await
        .expect("reconciliation should succeed");
    assert_eq!(report.outcome, ReconcileOutcome::Completed);
    assert_eq!(report.applied, 2);

    let a = storage.disbursement(id_a).expect("disbursement exists");
    assert_eq!(a.status, DisbursementStatus::Accepted);
    assert!(a.feedback_errors.is_empty());
    let b = storage.disbursement(id_b).expect("disbursement exists");
    assert_eq!(b.status, DisbursementStatus::Rejected);
    assert_eq!(b.feedback_errors, vec!["EDU-00123".to_string()]);
}

#[test_log::test(tokio::test)]
async fn uploaded_ecert_body_decodes_back_to_the_same_records() {
    let (storage, transfer, builder, _) = harness();
    storage.insert_disbursement(disbursement("123456782", "SMITH"));
    storage.insert_disbursement(disbursement("046454286", "NGUYEN"));

    let output = builder
        .send_ecert(OfferingIntensity::FullTime)
        .await
        .expect("send should succeed")
        .expect("a batch should ship");

    let body = transfer
        .uploaded(&output.batch.file_name)
        .expect("uploaded body exists");
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 4);

    let header = EcertHeader::from_line(lines[0], OfferingIntensity::FullTime)
        .expect("header decodes");
    assert_eq!(header.sequence, output.batch.sequence_number);

    let mut decoded_amount = Money::ZERO;
    for line in &lines[1..3] {
        let detail = EcertDetail::from_line(line, OfferingIntensity::FullTime)
            .expect("detail decodes");
        assert_eq!(detail.institution_code, "AUBC");
        assert_eq!(detail.award_amount, Money::from_minor(123456));
        decoded_amount = decoded_amount
            .checked_add(detail.award_amount)
            .expect("no overflow");
    }

    let footer =
        EcertFooter::from_line(lines[3], OfferingIntensity::FullTime).expect("footer decodes");
    assert_eq!(footer.record_count, 2);
    assert_eq!(footer.total_amount, decoded_amount);
}

#[test_log::test(tokio::test)]
async fn concurrent_allocations_never_repeat_a_value() {
    let storage = Arc::new(MemoryStorage::new());

    let mut handles = Vec::new();
    for _ in 0..50 {
        let storage = storage.clone();
        handles.push(tokio::spawn(async move {
            storage.next("ecert-ft").await.expect("allocation succeeds")
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        let value = handle.await.expect("task completes");
        assert!(seen.insert(value), "value {} allocated twice", value);
    }
    assert_eq!(seen.len(), 50);
    assert_eq!(seen.iter().max(), Some(&50));
}

#[test_log::test(tokio::test)]
async fn reprocessing_the_same_file_mutates_nothing() {
    let (storage, transfer, builder, reconciler) = harness();
    let d = disbursement("123456782", "SMITH");
    let id = d.id;
    storage.insert_disbursement(d);
    builder
        .send_ecert(OfferingIntensity::FullTime)
        .await
        .expect("send should succeed");
    let doc = storage
        .disbursement(id)
        .and_then(|d| d.document_number)
        .expect("document number assigned");

    let feedback = ecert_feedback_body(&[EcertFeedbackRecord {
        intensity: OfferingIntensity::FullTime,
        document_number: doc,
        sin: sin("123456782"),
        error_codes: Vec::new(),
    }]);
    transfer.seed_inbound("PBC.EDU.ECERT.FT.FB.20250902.001", &feedback);

    let first = reconciler
        .process_file("PBC.EDU.ECERT.FT.FB.20250902.001")
        .await
        .expect("first run succeeds");
    assert_eq!(first.outcome, ReconcileOutcome::Completed);
    let mutations_after_first = storage.mutation_count();
    assert!(mutations_after_first > 0);

    let second = reconciler
        .process_file("PBC.EDU.ECERT.FT.FB.20250902.001")
        .await
        .expect("second run succeeds");
    assert_eq!(second.outcome, ReconcileOutcome::Skipped);
    assert_eq!(second.applied, 0);
    assert_eq!(storage.mutation_count(), mutations_after_first);
}

#[test_log::test(tokio::test)]
async fn unknown_document_fails_its_line_and_leaves_the_rest_applied() {
    let (storage, transfer, builder, reconciler) = harness();
    let a = disbursement("123456782", "SMITH");
    let b = disbursement("046454286", "NGUYEN");
    let (id_a, id_b) = (a.id, b.id);
    storage.insert_disbursement(a);
    storage.insert_disbursement(b);
    builder
        .send_ecert(OfferingIntensity::FullTime)
        .await
        .expect("send should succeed");
    let doc_a = storage
        .disbursement(id_a)
        .and_then(|d| d.document_number)
        .expect("document number assigned");
    let doc_b = storage
        .disbursement(id_b)
        .and_then(|d| d.document_number)
        .expect("document number assigned");

    let feedback = ecert_feedback_body(&[
        EcertFeedbackRecord {
            intensity: OfferingIntensity::FullTime,
            document_number: doc_a,
            sin: sin("123456782"),
            error_codes: Vec::new(),
        },
        EcertFeedbackRecord {
            intensity: OfferingIntensity::FullTime,
            document_number: DocumentNumber(999_999),
            sin: sin("123456782"),
            error_codes: Vec::new(),
        },
        EcertFeedbackRecord {
            intensity: OfferingIntensity::FullTime,
            document_number: doc_b,
            sin: sin("046454286"),
            error_codes: Vec::new(),
        },
    ]);
    transfer.seed_inbound("PBC.EDU.ECERT.FT.FB.20250902.001", &feedback);

    let report = reconciler
        .process_file("PBC.EDU.ECERT.FT.FB.20250902.001")
        .await
        .expect("reconciliation should succeed");
    assert_eq!(report.outcome, ReconcileOutcome::PartiallyFailed);
    assert_eq!(report.applied, 2);
    assert_eq!(report.failures.len(), 1);
    // Line 1 is the header; the bad record is the second detail.
    assert_eq!(report.failures[0].line_number, 3);

    assert_eq!(
        storage.disbursement(id_a).map(|d| d.status),
        Some(DisbursementStatus::Accepted)
    );
    assert_eq!(
        storage.disbursement(id_b).map(|d| d.status),
        Some(DisbursementStatus::Accepted)
    );
}

#[test_log::test(tokio::test)]
async fn footer_count_mismatch_rejects_the_file_before_any_line_applies() {
    let (storage, transfer, builder, reconciler) = harness();
    let d = disbursement("123456782", "SMITH");
    let id = d.id;
    storage.insert_disbursement(d);
    builder
        .send_ecert(OfferingIntensity::FullTime)
        .await
        .expect("send should succeed");
    let doc = storage
        .disbursement(id)
        .and_then(|d| d.document_number)
        .expect("document number assigned");
    let mutations_before = storage.mutation_count();

    let record = EcertFeedbackRecord {
        intensity: OfferingIntensity::FullTime,
        document_number: doc,
        sin: sin("123456782"),
        error_codes: Vec::new(),
    };
    // Footer claims two details but only one is present.
    let header = EcertHeader {
        intensity: OfferingIntensity::FullTime,
        environment: 'P',
        created: NaiveDate::from_ymd_opt(2025, 9, 2)
            .expect("valid date")
            .and_hms_opt(8, 30, 0)
            .expect("valid time"),
        sequence: 1,
    };
    let footer = EcertFooter {
        intensity: OfferingIntensity::FullTime,
        record_count: 2,
        total_amount: Money::ZERO,
        sin_hash_total: 0,
    };
    let body = join(vec![
        header.to_line().expect("header encodes"),
        record.to_line().expect("record encodes"),
        footer.to_line().expect("footer encodes"),
    ]);
    transfer.seed_inbound("PBC.EDU.ECERT.FT.FB.20250902.001", &body);

    let reports = reconciler
        .process_new_files("inbound")
        .await
        .expect("sweep should succeed");
    assert_eq!(reports.len(), 1);
    assert!(matches!(
        reports[0].outcome,
        ReconcileOutcome::Rejected { .. }
    ));
    assert_eq!(storage.mutation_count(), mutations_before);
    assert_eq!(
        storage.disbursement(id).map(|d| d.status),
        Some(DisbursementStatus::Sent)
    );
    // A rejected file is never registered.
    assert!(storage.registered_files().is_empty());

    // A corrected re-delivery under the same name is picked up.
    let fixed = ecert_feedback_body(&[record]);
    transfer.seed_inbound("PBC.EDU.ECERT.FT.FB.20250902.001", &fixed);
    let report = reconciler
        .process_file("PBC.EDU.ECERT.FT.FB.20250902.001")
        .await
        .expect("corrected file applies");
    assert_eq!(report.outcome, ReconcileOutcome::Completed);
    assert_eq!(
        storage.disbursement(id).map(|d| d.status),
        Some(DisbursementStatus::Accepted)
    );
    assert_eq!(
        storage.registered_files(),
        vec!["PBC.EDU.ECERT.FT.FB.20250902.001".to_string()]
    );
}

#[test_log::test(tokio::test)]
async fn footer_aggregate_mismatch_rejects_the_file_before_any_line_applies() {
    let (storage, transfer, builder, reconciler) = harness();
    let d = disbursement("123456782", "SMITH");
    let id = d.id;
    storage.insert_disbursement(d);
    builder
        .send_ecert(OfferingIntensity::FullTime)
        .await
        .expect("send should succeed");
    let doc = storage
        .disbursement(id)
        .and_then(|d| d.document_number)
        .expect("document number assigned");
    let mutations_before = storage.mutation_count();

    // Record count matches, but the SIN hash total does not recount.
    let header = EcertHeader {
        intensity: OfferingIntensity::FullTime,
        environment: 'P',
        created: NaiveDate::from_ymd_opt(2025, 9, 2)
            .expect("valid date")
            .and_hms_opt(8, 30, 0)
            .expect("valid time"),
        sequence: 1,
    };
    let record = EcertFeedbackRecord {
        intensity: OfferingIntensity::FullTime,
        document_number: doc,
        sin: sin("123456782"),
        error_codes: Vec::new(),
    };
    let footer = EcertFooter {
        intensity: OfferingIntensity::FullTime,
        record_count: 1,
        total_amount: Money::ZERO,
        sin_hash_total: 999_999_999,
    };
    let body = join(vec![
        header.to_line().expect("header encodes"),
        record.to_line().expect("record encodes"),
        footer.to_line().expect("footer encodes"),
    ]);
    transfer.seed_inbound("PBC.EDU.ECERT.FT.FB.20250902.001", &body);

    let reports = reconciler
        .process_new_files("inbound")
        .await
        .expect("sweep should succeed");
    assert_eq!(reports.len(), 1);
    assert!(matches!(
        reports[0].outcome,
        ReconcileOutcome::Rejected { .. }
    ));
    assert_eq!(storage.mutation_count(), mutations_before);
    assert_eq!(
        storage.disbursement(id).map(|d| d.status),
        Some(DisbursementStatus::Sent)
    );
}

#[test_log::test(tokio::test)]
async fn sin_validation_cycle_updates_check_status() {
    let (storage, transfer, builder, reconciler) = harness();
    let check = SinCheck {
        id: Uuid::new_v4(),
        sin: sin("123456782"),
        last_name: "SMITH".to_string(),
        given_name: "ALEX".to_string(),
        birth_date: NaiveDate::from_ymd_opt(2001, 4, 15).expect("valid date"),
        gender: Some('F'),
        document_number: None,
        status: SinCheckStatus::Pending,
        updated_at: Utc::now(),
    };
    let id = check.id;
    storage.insert_sin_check(check);

    builder
        .send_sin_validation()
        .await
        .expect("send should succeed")
        .expect("a batch should ship");
    let reference = storage
        .sin_check(id)
        .and_then(|c| c.document_number)
        .expect("reference assigned");

    let response = SinResponseRecord {
        reference_index: reference,
        sin: sin("123456782"),
        is_valid: true,
    };
    let header = SinHeader {
        created: NaiveDate::from_ymd_opt(2025, 9, 3)
            .expect("valid date")
            .and_hms_opt(6, 0, 0)
            .expect("valid time"),
        sequence: 1,
    };
    let footer = SinFooter::compute_over([response.sin.value()].into_iter());
    let body = join(vec![
        header.to_line().expect("header encodes"),
        response.to_line().expect("response encodes"),
        footer.to_line().expect("footer encodes"),
    ]);
    transfer.seed_inbound("PBC.EDU.SIN.RESP.20250903.001", &body);

    let report = reconciler
        .process_file("PBC.EDU.SIN.RESP.20250903.001")
        .await
        .expect("reconciliation should succeed");
    assert_eq!(report.outcome, ReconcileOutcome::Completed);
    assert_eq!(
        storage.sin_check(id).map(|c| c.status),
        Some(SinCheckStatus::Valid)
    );
}

#[test_log::test(tokio::test)]
async fn msfaa_cycle_records_signed_agreements() {
    let (storage, transfer, builder, reconciler) = harness();
    let agreement = MsfaaAgreement {
        id: Uuid::new_v4(),
        sin: sin("123456782"),
        birth_date: NaiveDate::from_ymd_opt(2001, 4, 15).expect("valid date"),
        last_name: "SMITH".to_string(),
        given_name: "ALEX".to_string(),
        intensity: OfferingIntensity::FullTime,
        msfaa_number: None,
        status: MsfaaStatus::Pending,
        status_date: None,
        cancel_reason: None,
        updated_at: Utc::now(),
    };
    let id = agreement.id;
    storage.insert_msfaa_agreement(agreement);

    builder
        .send_msfaa()
        .await
        .expect("send should succeed")
        .expect("a batch should ship");
    let msfaa_number = storage
        .msfaa_agreement(id)
        .and_then(|a| a.msfaa_number)
        .expect("number assigned");

    let signed_date = NaiveDate::from_ymd_opt(2025, 9, 10).expect("valid date");
    let response = MsfaaResponseRecord {
        msfaa_number,
        sin: sin("123456782"),
        outcome: MsfaaOutcome::Received { signed_date },
    };
    let header = MsfaaHeader {
        created: NaiveDate::from_ymd_opt(2025, 9, 12)
            .expect("valid date")
            .and_hms_opt(7, 0, 0)
            .expect("valid time"),
        sequence: 1,
    };
    let footer = MsfaaFooter::compute_over([response.sin.value()].into_iter());
    let body = join(vec![
        header.to_line().expect("header encodes"),
        response.to_line().expect("response encodes"),
        footer.to_line().expect("footer encodes"),
    ]);
    transfer.seed_inbound("PBC.EDU.MSFAA.RESP.20250912.001", &body);

    let report = reconciler
        .process_file("PBC.EDU.MSFAA.RESP.20250912.001")
        .await
        .expect("reconciliation should succeed");
    assert_eq!(report.outcome, ReconcileOutcome::Completed);

    let stored = storage.msfaa_agreement(id).expect("agreement exists");
    assert_eq!(stored.status, MsfaaStatus::Signed);
    assert_eq!(stored.status_date, Some(signed_date));
}

#[test_log::test(tokio::test)]
async fn receipt_file_marks_disbursements_receipted() {
    let (storage, transfer, builder, reconciler) = harness();
    let d = disbursement("123456782", "SMITH");
    let id = d.id;
    storage.insert_disbursement(d);
    builder
        .send_ecert(OfferingIntensity::FullTime)
        .await
        .expect("send should succeed");
    let doc = storage
        .disbursement(id)
        .and_then(|d| d.document_number)
        .expect("document number assigned");

    let detail = ReceiptDetail {
        document_number: doc,
        funding_type: FundingType::Federal,
        amount: Money::from_minor(123456),
    };
    let header = ReceiptHeader {
        batch_date: NaiveDate::from_ymd_opt(2025, 9, 15).expect("valid date"),
    };
    let footer = ReceiptFooter {
        record_count: 1,
        total_amount: Money::from_minor(123456),
    };
    let body = join(vec![
        header.to_line().expect("header encodes"),
        detail.to_line().expect("detail encodes"),
        footer.to_line().expect("footer encodes"),
    ]);
    transfer.seed_inbound("PBC.EDU.RECEIPT.20250915.001", &body);

    let report = reconciler
        .process_file("PBC.EDU.RECEIPT.20250915.001")
        .await
        .expect("reconciliation should succeed");
    assert_eq!(report.outcome, ReconcileOutcome::Completed);

    let stored = storage.disbursement(id).expect("disbursement exists");
    assert_eq!(stored.status, DisbursementStatus::Receipted);
    assert_eq!(stored.receipted_amount, Some(Money::from_minor(123456)));
}

#[test_log::test(tokio::test)]
async fn restriction_redelivery_overwrites_instead_of_duplicating() {
    let (storage, transfer, _, reconciler) = harness();

    let restriction_body = |effective: NaiveDate| {
        let header = RestrictionHeader {
            file_date: NaiveDate::from_ymd_opt(2025, 9, 20).expect("valid date"),
        };
        let detail = RestrictionDetail {
            sin: sin("123456782"),
            restriction_code: "B2".to_string(),
            effective_date: effective,
        };
        let footer = RestrictionFooter { record_count: 1 };
        join(vec![
            header.to_line().expect("header encodes"),
            detail.to_line().expect("detail encodes"),
            footer.to_line().expect("footer encodes"),
        ])
    };

    let first_date = NaiveDate::from_ymd_opt(2025, 9, 1).expect("valid date");
    transfer.seed_inbound(
        "PBC.EDU.RESTRICT.20250920.001",
        &restriction_body(first_date),
    );
    reconciler
        .process_file("PBC.EDU.RESTRICT.20250920.001")
        .await
        .expect("first file applies");

    let later_date = NaiveDate::from_ymd_opt(2025, 10, 1).expect("valid date");
    transfer.seed_inbound(
        "PBC.EDU.RESTRICT.20250921.001",
        &restriction_body(later_date),
    );
    reconciler
        .process_file("PBC.EDU.RESTRICT.20250921.001")
        .await
        .expect("second file applies");

    let restrictions = storage.restrictions();
    assert_eq!(restrictions.len(), 1);
    assert_eq!(restrictions[0].code, "B2");
    assert_eq!(restrictions[0].effective_date, later_date);
}
