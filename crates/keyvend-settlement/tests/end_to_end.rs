//! Full-engine scenarios: checkout through settlement against the wired
//! service, including the races and failure windows the state machines
//! exist to close.

use std::sync::Arc;

use chrono::{Duration, Utc};
use keyvend_settlement::signature;
use keyvend_settlement::{CallbackClaim, VendService};
use keyvend_types::{
    AccessKey, EngineConfig, KeyStatus, PaymentStatus, ProviderId, ProviderSettings, SaleChannel,
    Tariff, TariffId, TariffPatch, VendError,
};

fn engine(stock: usize, config: EngineConfig) -> (VendService, TariffId) {
    engine_with_settings(stock, config, ProviderSettings::default())
}

fn engine_with_settings(
    stock: usize,
    config: EngineConfig,
    settings: ProviderSettings,
) -> (VendService, TariffId) {
    let service = VendService::new(settings, config);
    let tariff = service.tariffs().insert(Tariff::new("Monthly", 999));
    for _ in 0..stock {
        service.keys().insert(AccessKey::dummy(tariff));
    }
    (service, tariff)
}

/// TTL of zero: every hold is already expired by the time anything looks
/// at it again.
fn instant_expiry() -> EngineConfig {
    EngineConfig {
        reservation_ttl_minutes: 0,
        sweep_interval_secs: 60,
    }
}

#[test]
fn happy_path_checkout_to_delivery() {
    let (service, tariff) = engine(1, EngineConfig::default());

    let before = Utc::now();
    let session = service
        .create_payment(tariff, SaleChannel::Web, None)
        .unwrap();

    assert_eq!(session.payment.status, PaymentStatus::Pending);
    assert_eq!(session.payment.amount_minor, 999);
    let held = session.reserved_key.unwrap();
    assert_eq!(service.keys().get(held).unwrap().status, KeyStatus::Reserved);

    let window = session.reserved_until.unwrap() - before;
    assert!(window >= Duration::minutes(15), "hold must run the full TTL");
    assert!(window < Duration::minutes(16));

    let outcome = service.settle_payment(session.payment.id).unwrap();
    assert!(outcome.payment.is_paid());
    assert_eq!(outcome.payment.sold_key, Some(held));

    let delivered = outcome.sold_key.unwrap();
    assert_eq!(delivered.id, held);
    assert_eq!(delivered.status, KeyStatus::Sold);
    assert!(!delivered.raw_uri.is_empty(), "the credential is the product");
    assert_eq!(delivered.channel, Some(SaleChannel::Web));
    assert!(service.alerts().is_empty());
}

#[test]
fn checkout_without_inventory_still_opens_payment() {
    let (service, tariff) = engine(0, EngineConfig::default());

    let session = service
        .create_payment(tariff, SaleChannel::Bot, None)
        .unwrap();
    assert_eq!(session.payment.status, PaymentStatus::Pending);
    assert!(session.reserved_key.is_none());
    assert!(session.reserved_until.is_none());
    assert!(
        session.checkout_url.contains("amount=999"),
        "invoice is built even with no stock"
    );
}

#[test]
fn double_settlement_returns_recorded_outcome() {
    let (service, tariff) = engine(1, EngineConfig::default());
    let session = service
        .create_payment(tariff, SaleChannel::Web, None)
        .unwrap();

    let first = service.settle_payment(session.payment.id).unwrap();
    let second = service.settle_payment(session.payment.id).unwrap();

    assert_eq!(first.payment.id, second.payment.id);
    assert_eq!(first.payment.sold_key, second.payment.sold_key);
    assert_eq!(
        first.sold_key.as_ref().map(|k| k.id),
        second.sold_key.as_ref().map(|k| k.id)
    );
    assert_eq!(second.payment.status, PaymentStatus::Paid);

    let sold: Vec<_> = service
        .keys()
        .list()
        .into_iter()
        .filter(|k| k.status == KeyStatus::Sold)
        .collect();
    assert_eq!(sold.len(), 1, "repeat settlement must not sell again");
}

#[test]
fn concurrent_settlements_deliver_once() {
    let (service, tariff) = engine(1, EngineConfig::default());
    let session = service
        .create_payment(tariff, SaleChannel::Web, None)
        .unwrap();
    let payment_id = session.payment.id;
    let held = session.reserved_key.unwrap();

    let service = Arc::new(service);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            std::thread::spawn(move || service.settle_payment(payment_id))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let payment = service.ledger().get(payment_id).unwrap();
    assert_eq!(payment.status, PaymentStatus::Paid);
    assert_eq!(payment.sold_key, Some(held));
    assert_eq!(service.keys().get(held).unwrap().status, KeyStatus::Sold);
    assert!(
        service.alerts().is_empty(),
        "losers must return the recorded outcome, not raise alerts"
    );
}

#[test]
fn expired_hold_is_swept_and_settlement_pays_without_key() {
    let (service, tariff) = engine(1, instant_expiry());

    let session = service
        .create_payment(tariff, SaleChannel::Web, None)
        .unwrap();
    let held = session.reserved_key.unwrap();
    assert_eq!(session.reserved_until, session.payment.reserved_until);

    // The hold was born expired; the provider confirms afterwards.
    let outcome = service.settle_payment(session.payment.id).unwrap();
    assert!(outcome.payment.is_paid());
    assert!(outcome.sold_key.is_none(), "the key already went back to stock");
    assert!(outcome.payment.sold_key.is_none());

    assert_eq!(
        service.keys().get(held).unwrap().status,
        KeyStatus::Available,
        "the swept key is sellable again"
    );
    assert_eq!(service.alerts().count(), 1, "paid-but-unfulfilled must surface");
}

#[test]
fn stale_snapshot_sells_to_the_live_holder_only() {
    let (service, tariff) = engine(1, EngineConfig::default());

    let first = service
        .create_payment(tariff, SaleChannel::Web, None)
        .unwrap();
    let key = first.reserved_key.unwrap();

    // Operator frees the hold; a second checkout takes the same key under
    // a fresh expiry. The first payment still carries the old snapshot.
    service.release_key(key).unwrap();
    let second = service
        .create_payment(tariff, SaleChannel::Web, None)
        .unwrap();
    assert_eq!(second.reserved_key, Some(key));
    assert_ne!(second.reserved_until, first.reserved_until);

    let first_outcome = service.settle_payment(first.payment.id).unwrap();
    assert!(first_outcome.payment.is_paid());
    assert!(
        first_outcome.sold_key.is_none(),
        "a stale snapshot must never take the key from the live hold"
    );

    let second_outcome = service.settle_payment(second.payment.id).unwrap();
    assert_eq!(second_outcome.sold_key.map(|k| k.id), Some(key));

    assert_eq!(service.keys().get(key).unwrap().status, KeyStatus::Sold);
    assert_eq!(service.alerts().count(), 1, "only the first settlement alerts");
}

#[test]
fn forged_callback_signature_mutates_nothing() {
    let mut settings = ProviderSettings::default();
    settings.crystalpay.secret = Some("cb-secret".into());
    let (service, tariff) = engine_with_settings(1, EngineConfig::default(), settings);

    let session = service
        .create_payment(tariff, SaleChannel::Web, None)
        .unwrap();
    let held = session.reserved_key.unwrap();

    // Signature computed over a different amount.
    let forged = signature::sign("cb-secret", &session.payment.external_id, 1).unwrap();
    let err = service
        .confirm_callback(
            ProviderId::CrystalPay,
            &CallbackClaim {
                external_id: session.payment.external_id.clone(),
                amount_minor: 999,
                signature: Some(forged),
            },
        )
        .unwrap_err();
    assert!(matches!(err, VendError::InvalidSignature { .. }));

    // And one with no signature at all.
    let err = service
        .confirm_callback(
            ProviderId::CrystalPay,
            &CallbackClaim {
                external_id: session.payment.external_id.clone(),
                amount_minor: 999,
                signature: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, VendError::InvalidSignature { .. }));

    let payment = service.ledger().get(session.payment.id).unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending, "no state change");
    assert_eq!(payment.reserved_key, Some(held));
    assert_eq!(service.keys().get(held).unwrap().status, KeyStatus::Reserved);
    assert!(service.alerts().is_empty());
}

#[test]
fn signed_callback_settles_and_delivers() {
    let mut settings = ProviderSettings::default();
    settings.crystalpay.secret = Some("cb-secret".into());
    let (service, tariff) = engine_with_settings(1, EngineConfig::default(), settings);

    let session = service
        .create_payment(tariff, SaleChannel::Web, None)
        .unwrap();
    let signed = signature::sign("cb-secret", &session.payment.external_id, 999).unwrap();

    let outcome = service
        .confirm_callback(
            ProviderId::CrystalPay,
            &CallbackClaim {
                external_id: session.payment.external_id.clone(),
                amount_minor: 999,
                signature: Some(signed),
            },
        )
        .unwrap();
    assert!(outcome.payment.is_paid());
    assert_eq!(
        outcome.sold_key.map(|k| k.id),
        session.reserved_key,
        "the held key is the delivered key"
    );
}

#[test]
fn price_update_leaves_open_payment_amount_unchanged() {
    let (service, tariff) = engine(1, EngineConfig::default());
    let session = service
        .create_payment(tariff, SaleChannel::Web, None)
        .unwrap();
    assert_eq!(session.payment.amount_minor, 999);

    service
        .tariffs()
        .update(
            tariff,
            TariffPatch {
                price_minor: Some(1999),
                ..TariffPatch::default()
            },
        )
        .unwrap();

    let outcome = service.settle_payment(session.payment.id).unwrap();
    assert_eq!(
        outcome.payment.amount_minor, 999,
        "amount was copied at checkout, price edits never touch it"
    );

    let view = service.payment_status(session.payment.id).unwrap();
    assert_eq!(view.payment.amount_minor, 999);
    assert_eq!(view.tariff.price_minor, 1999, "the catalog moved on");

    // The next checkout pays the new price.
    service.keys().insert(AccessKey::dummy(tariff));
    let next = service
        .create_payment(tariff, SaleChannel::Web, None)
        .unwrap();
    assert_eq!(next.payment.amount_minor, 1999);
}

#[test]
fn concurrent_checkouts_one_key_one_winner() {
    let (service, tariff) = engine(1, EngineConfig::default());
    let service = Arc::new(service);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            std::thread::spawn(move || service.create_payment(tariff, SaleChannel::Web, None))
        })
        .collect();
    let sessions: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    let with_key = sessions.iter().filter(|s| s.reserved_key.is_some()).count();
    assert_eq!(with_key, 1, "one key, one hold");
    assert_eq!(
        service.ledger().count(),
        8,
        "every checkout opens a payment, stocked or not"
    );

    // Only the winner's settlement delivers.
    let mut delivered = 0;
    for session in &sessions {
        let outcome = service.settle_payment(session.payment.id).unwrap();
        if outcome.sold_key.is_some() {
            delivered += 1;
        }
    }
    assert_eq!(delivered, 1);
    assert_eq!(service.alerts().count(), 7, "seven paid checkouts went unfulfilled");
}
