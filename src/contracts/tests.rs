//! End-to-end tests for the price bet and the stateful multisig covenant.

use super::covenant::{locking_script, CovenantInstance};
use super::*;
use crate::commitment::{self, ExpectedOutput, SpendingContext};
use crate::demo::demo_oracle_key;
use crate::error::{ContractError, WindowBound};
use crate::oracle::{encode_exchange_rate, ExchangeRate, RabinPublicKey, RabinSignature, Symbol};
use bitcoin::{
    absolute::LockTime,
    ecdsa,
    hashes::Hash,
    secp256k1::{Message, Secp256k1, SecretKey},
    sighash::EcdsaSighashType,
    transaction::Version,
    Amount, OutPoint, PubkeyHash, PublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Witness,
};

const BALANCE: Amount = Amount::from_sat(10_000);

fn spending_tx(outputs: &[ExpectedOutput]) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        }],
        output: outputs.iter().cloned().map(TxOut::from).collect(),
    }
}

// ----- price bet -----

fn alice() -> PubkeyHash {
    PubkeyHash::from_byte_array([0xa1; 20])
}

fn bob() -> PubkeyHash {
    PubkeyHash::from_byte_array([0xb0; 20])
}

/// Bet on BSV_USDC reaching 36.0000 between t=1_700_000_000 and t=1_700_086_400
fn create_test_bet() -> PriceBet {
    PriceBet::new(
        360_000,
        Symbol::from_tag("BSV_USDC"),
        1_700_000_000,
        1_700_086_400,
        demo_oracle_key().unwrap().public_key(),
        alice(),
        bob(),
    )
    .unwrap()
}

fn rate(timestamp: u64, price: u128, symbol: &str) -> ExchangeRate {
    ExchangeRate {
        timestamp,
        price,
        symbol: Symbol::from_tag(symbol),
    }
}

fn oracle_message(rate: &ExchangeRate) -> (Vec<u8>, RabinSignature) {
    let message = encode_exchange_rate(rate, 4);
    let signature = demo_oracle_key().unwrap().sign(&message).unwrap();
    (message, signature)
}

fn paying(pkh: &PubkeyHash, amount: Amount) -> SpendingContext {
    SpendingContext::for_outputs(BALANCE, &[commitment::p2pkh(pkh, amount)])
}

#[test]
fn test_settle_pays_winner_full_balance() {
    let bet = create_test_bet();
    let cases = [
        (360_001, Party::Alice, alice()),
        (360_000, Party::Alice, alice()),
        (359_999, Party::Bob, bob()),
        (1, Party::Bob, bob()),
    ];

    for (price, winner, pkh) in cases {
        let (message, signature) = oracle_message(&rate(1_700_000_500, price, "BSV_USDC"));
        let settlement = bet
            .settle(&message, &signature, &paying(&pkh, BALANCE))
            .unwrap();
        assert_eq!(settlement.winner, winner, "price {}", price);
        assert_eq!(settlement.payout, commitment::p2pkh(&pkh, BALANCE));
        assert_eq!(settlement.rate.price, price);
    }
}

#[test]
fn test_settle_rejects_loser_payout() {
    let bet = create_test_bet();
    let (message, signature) = oracle_message(&rate(1_700_000_500, 400_000, "BSV_USDC"));

    let err = bet
        .settle(&message, &signature, &paying(&bob(), BALANCE))
        .unwrap_err();
    assert!(matches!(err, ContractError::OutputCommitmentMismatch { .. }));

    // winner but short of the full balance
    let err = bet
        .settle(&message, &signature, &paying(&alice(), Amount::from_sat(9_000)))
        .unwrap_err();
    assert!(matches!(err, ContractError::OutputCommitmentMismatch { .. }));

    // winner plus an extra output
    let ctx = SpendingContext::for_outputs(
        BALANCE,
        &[
            commitment::p2pkh(&alice(), BALANCE),
            commitment::p2pkh(&bob(), Amount::from_sat(1)),
        ],
    );
    assert!(bet.settle(&message, &signature, &ctx).is_err());
}

#[test]
fn test_settle_refuses_declared_change() {
    let bet = create_test_bet();
    let (message, signature) = oracle_message(&rate(1_700_000_500, 400_000, "BSV_USDC"));
    let change = commitment::p2pkh(&bob(), Amount::from_sat(5_000));
    let ctx = SpendingContext::for_outputs(
        BALANCE,
        &[commitment::p2pkh(&alice(), BALANCE), change.clone()],
    )
    .with_change(change);

    let err = bet.settle(&message, &signature, &ctx).unwrap_err();
    assert!(matches!(err, ContractError::OutputCommitmentMismatch { .. }));
}

#[test]
fn test_settle_outside_window_regardless_of_price() {
    let bet = create_test_bet();
    for price in [0u128, 360_000, u128::MAX] {
        for (timestamp, bound) in [
            (1_699_999_999, WindowBound::TooEarly),
            (0, WindowBound::TooEarly),
            (1_700_086_401, WindowBound::TooLate),
        ] {
            let (message, signature) = oracle_message(&rate(timestamp, price, "BSV_USDC"));
            let ctx = paying(&alice(), BALANCE);
            match bet.settle(&message, &signature, &ctx) {
                Err(ContractError::TimestampOutOfWindow { bound: got, .. }) => assert_eq!(got, bound),
                other => panic!("unexpected result {:?}", other),
            }
        }
    }
}

#[test]
fn test_settle_window_edges_accepted() {
    let bet = create_test_bet();
    for timestamp in [1_700_000_000, 1_700_086_400] {
        let (message, signature) = oracle_message(&rate(timestamp, 360_000, "BSV_USDC"));
        assert!(bet
            .settle(&message, &signature, &paying(&alice(), BALANCE))
            .is_ok());
    }
}

#[test]
fn test_settle_symbol_mismatch() {
    let bet = create_test_bet();
    let (message, signature) = oracle_message(&rate(1_700_000_500, 400_000, "BTC_USDC"));
    let err = bet
        .settle(&message, &signature, &paying(&alice(), BALANCE))
        .unwrap_err();
    match err {
        ContractError::SymbolMismatch { expected, actual } => {
            assert_eq!(expected, "BSV_USDC");
            assert_eq!(actual, "BTC_USDC");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_settle_first_failure_reported() {
    // wrong symbol and out of window: the window check runs first
    let bet = create_test_bet();
    let (message, signature) = oracle_message(&rate(5, 400_000, "BTC_USDC"));
    let err = bet
        .settle(&message, &signature, &paying(&alice(), BALANCE))
        .unwrap_err();
    assert_eq!(err.code(), "TIMESTAMP_OUT_OF_WINDOW");
}

#[test]
fn test_settle_tampered_message() {
    let bet = create_test_bet();
    let (message, signature) = oracle_message(&rate(1_700_000_500, 300_000, "BSV_USDC"));

    // flip a bit in the price so that Bob's loss would become a win for Alice
    let mut tampered = message.clone();
    tampered[10] ^= 0x80;
    let err = bet
        .settle(&tampered, &signature, &paying(&alice(), BALANCE))
        .unwrap_err();
    assert!(matches!(err, ContractError::OracleSignatureInvalid));

    for byte in [0usize, 8, 24, 30, 57] {
        let mut tampered = message.clone();
        tampered[byte] ^= 0x01;
        assert!(bet
            .settle(&tampered, &signature, &paying(&bob(), BALANCE))
            .is_err());
    }
}

#[test]
fn test_settle_wrong_oracle_key() {
    let mut bet = create_test_bet();
    bet.oracle_pubkey = RabinPublicKey::new(&bet.oracle_pubkey.n + 2u32);
    let (message, signature) = oracle_message(&rate(1_700_000_500, 400_000, "BSV_USDC"));
    let err = bet
        .settle(&message, &signature, &paying(&alice(), BALANCE))
        .unwrap_err();
    assert!(matches!(err, ContractError::OracleSignatureInvalid));
}

#[test]
fn test_settle_signed_but_short_message() {
    let bet = create_test_bet();
    let message = b"too short to be a rate".to_vec();
    let signature = demo_oracle_key().unwrap().sign(&message).unwrap();
    let err = bet
        .settle(&message, &signature, &paying(&alice(), BALANCE))
        .unwrap_err();
    assert!(matches!(
        err,
        ContractError::MalformedMessage {
            expected: 58,
            actual: 22
        }
    ));
}

#[test]
fn test_settle_against_real_transaction() {
    let bet = create_test_bet();
    let market_rate = rate(1_700_040_000, 355_000, "BSV_USDC");
    let (message, signature) = oracle_message(&market_rate);

    let payout = bet.payout_for(&market_rate, BALANCE);
    let tx = spending_tx(&[payout]);
    let script_code = ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([0x55; 20]));
    let ctx = SpendingContext::from_transaction(&tx, 0, &script_code, BALANCE).unwrap();

    let settlement = bet.settle(&message, &signature, &ctx).unwrap();
    assert_eq!(settlement.winner, Party::Bob);
    assert_eq!(TxOut::from(settlement.payout), tx.output[0]);
}

// ----- stateful multisig -----

fn participants<const M: usize>() -> ([SecretKey; M], [PublicKey; M]) {
    let secp = Secp256k1::new();
    let secret_keys: [SecretKey; M] =
        std::array::from_fn(|i| SecretKey::from_slice(&[0x11 * (i as u8 + 1); 32]).unwrap());
    let pub_keys = std::array::from_fn(|i| PublicKey::new(secret_keys[i].public_key(&secp)));
    (secret_keys, pub_keys)
}

fn destination() -> PubkeyHash {
    PubkeyHash::from_byte_array([0xd5; 20])
}

/// Context for spending the covenant `current` (holding `balance`) into `outputs`
fn context_for<const M: usize, const N: usize>(
    current: &StatefulMultiSig<M, N>,
    balance: Amount,
    outputs: &[ExpectedOutput],
) -> SpendingContext {
    let script_code = locking_script(current).unwrap();
    SpendingContext::from_transaction(&spending_tx(outputs), 0, &script_code, balance).unwrap()
}

fn sign(secret_key: &SecretKey, ctx: &SpendingContext) -> ecdsa::Signature {
    let secp = Secp256k1::new();
    let signature = secp.sign_ecdsa(&Message::from_digest(ctx.sighash), secret_key);
    ecdsa::Signature::sighash_all(signature)
}

#[test]
fn test_add_valid_signature() {
    let (secret_keys, pub_keys) = participants::<3>();
    let multisig = DefaultMultiSig::new(destination(), pub_keys).unwrap();

    let next = multisig.expected_add_output(0, BALANCE).unwrap();
    let ctx = context_for(&multisig, BALANCE, &[next]);
    let signature = sign(&secret_keys[0], &ctx);

    let successor = multisig.add(0, &signature, &ctx, None).unwrap();
    assert_eq!(successor.validated(), &[true, false, false]);
    assert_eq!(successor.pub_keys(), multisig.pub_keys());
    assert_eq!(successor.dest_pkh(), multisig.dest_pkh());
}

#[test]
fn test_add_same_index_twice_fails() {
    let (secret_keys, pub_keys) = participants::<3>();
    let multisig = StatefulMultiSig::<3, 3>::new(destination(), pub_keys).unwrap();

    let ctx = context_for(&multisig, BALANCE, &[multisig.expected_add_output(1, BALANCE).unwrap()]);
    let after_first = multisig.add(1, &sign(&secret_keys[1], &ctx), &ctx, None).unwrap();

    // a second spend by the same participant, recreating the state unchanged
    let unchanged = CovenantInstance::new(after_first.clone(), BALANCE)
        .to_output()
        .unwrap();
    let ctx = context_for(&after_first, BALANCE, &[unchanged]);
    let err = after_first
        .add(1, &sign(&secret_keys[1], &ctx), &ctx, None)
        .unwrap_err();
    assert!(matches!(err, ContractError::InvalidIndexOrAlreadySet { index: 1 }));

    assert!(matches!(
        after_first.add(3, &sign(&secret_keys[1], &ctx), &ctx, None),
        Err(ContractError::InvalidIndexOrAlreadySet { index: 3 })
    ));
}

#[test]
fn test_three_of_three_end_to_end() {
    let (secret_keys, pub_keys) = participants::<3>();
    let mut multisig = StatefulMultiSig::<3, 3>::new(destination(), pub_keys).unwrap();
    let mut utxo = TxOut::from(CovenantInstance::new(multisig.clone(), BALANCE).to_output().unwrap());

    for index in 0..3 {
        // the wallet reads the state from the output it is about to spend
        let current = CovenantInstance::<StatefulMultiSig<3, 3>>::from_output(&utxo).unwrap();
        assert_eq!(current.state, multisig);

        let next = multisig.expected_add_output(index, utxo.value).unwrap();
        let tx = spending_tx(&[next]);
        let ctx =
            SpendingContext::from_transaction(&tx, 0, &utxo.script_pubkey, utxo.value).unwrap();

        multisig = multisig
            .add(index, &sign(&secret_keys[index], &ctx), &ctx, None)
            .unwrap();
        assert_eq!(multisig.true_count(), index + 1);
        utxo = tx.output[0].clone();
    }

    assert_eq!(multisig.phase(), Phase::Payable);
    let payout = multisig.expected_pay_output(utxo.value);
    let ctx = context_for(&multisig, utxo.value, &[payout]);
    let paid = multisig.pay(&ctx).unwrap();
    assert_eq!(paid, commitment::p2pkh(&destination(), BALANCE));
}

#[test]
fn test_pay_requires_threshold() {
    let (_, pub_keys) = participants::<3>();

    let fresh = DefaultMultiSig::new(destination(), pub_keys).unwrap();
    let ctx = context_for(&fresh, BALANCE, &[fresh.expected_pay_output(BALANCE)]);
    assert!(matches!(
        fresh.pay(&ctx),
        Err(ContractError::ThresholdNotReached { have: 0, need: 2 })
    ));

    // N - 1 signatures
    let almost =
        StatefulMultiSig::<3, 3>::with_validated(destination(), pub_keys, [true, false, true]).unwrap();
    let ctx = context_for(&almost, BALANCE, &[almost.expected_pay_output(BALANCE)]);
    assert!(matches!(
        almost.pay(&ctx),
        Err(ContractError::ThresholdNotReached { have: 2, need: 3 })
    ));

    let reached = DefaultMultiSig::with_validated(destination(), pub_keys, [false, true, true]).unwrap();
    let ctx = context_for(&reached, BALANCE, &[reached.expected_pay_output(BALANCE)]);
    assert!(reached.pay(&ctx).is_ok());
}

#[test]
fn test_pay_must_go_to_destination() {
    let (_, pub_keys) = participants::<3>();
    let reached = DefaultMultiSig::with_validated(destination(), pub_keys, [true, true, false]).unwrap();

    let stolen = commitment::p2pkh(&PubkeyHash::from_byte_array([0x66; 20]), BALANCE);
    let ctx = context_for(&reached, BALANCE, &[stolen]);
    assert!(matches!(
        reached.pay(&ctx),
        Err(ContractError::OutputCommitmentMismatch { .. })
    ));

    let short = commitment::p2pkh(&destination(), Amount::from_sat(1_000));
    let ctx = context_for(&reached, BALANCE, &[short]);
    assert!(reached.pay(&ctx).is_err());
}

#[test]
fn test_foreign_key_signature_fails() {
    let (_, pub_keys) = participants::<3>();
    let multisig = DefaultMultiSig::new(destination(), pub_keys).unwrap();
    let outsider = SecretKey::from_slice(&[0x99; 32]).unwrap();

    for index in 0..3 {
        let ctx = context_for(
            &multisig,
            BALANCE,
            &[multisig.expected_add_output(index, BALANCE).unwrap()],
        );
        let err = multisig
            .add(index, &sign(&outsider, &ctx), &ctx, None)
            .unwrap_err();
        assert!(matches!(err, ContractError::SignatureCheckFailed { index: i } if i == index));
    }
}

#[test]
fn test_signature_from_other_participant_fails() {
    let (secret_keys, pub_keys) = participants::<3>();
    let multisig = DefaultMultiSig::new(destination(), pub_keys).unwrap();
    let ctx = context_for(&multisig, BALANCE, &[multisig.expected_add_output(0, BALANCE).unwrap()]);

    // participant 2 signs, claiming to be participant 0
    let err = multisig
        .add(0, &sign(&secret_keys[2], &ctx), &ctx, None)
        .unwrap_err();
    assert!(matches!(err, ContractError::SignatureCheckFailed { index: 0 }));
}

#[test]
fn test_signature_bound_to_transaction() {
    let (secret_keys, pub_keys) = participants::<3>();
    let multisig = DefaultMultiSig::new(destination(), pub_keys).unwrap();

    let honest = context_for(&multisig, BALANCE, &[multisig.expected_add_output(0, BALANCE).unwrap()]);
    let signature = sign(&secret_keys[0], &honest);

    // same signature reused on a transaction that also re-funds the covenant
    let other = context_for(
        &multisig,
        BALANCE,
        &[multisig
            .expected_add_output(0, Amount::from_sat(20_000))
            .unwrap()],
    );
    assert!(matches!(
        multisig.add(0, &signature, &other, Some(Amount::from_sat(20_000))),
        Err(ContractError::SignatureCheckFailed { .. })
    ));

    let single = ecdsa::Signature {
        signature: signature.signature,
        sighash_type: EcdsaSighashType::Single,
    };
    assert!(multisig.add(0, &single, &honest, None).is_err());
}

#[test]
fn test_successor_must_flip_exactly_one_flag() {
    let (secret_keys, pub_keys) = participants::<3>();
    let multisig = StatefulMultiSig::<3, 3>::new(destination(), pub_keys).unwrap();

    let tampered_states = [
        // flips a different flag than the one being validated
        StatefulMultiSig::<3, 3>::with_validated(destination(), pub_keys, [false, true, false]).unwrap(),
        // flips an extra flag
        StatefulMultiSig::<3, 3>::with_validated(destination(), pub_keys, [true, true, false]).unwrap(),
        // leaves the flag unset
        multisig.clone(),
        // swaps in another destination
        StatefulMultiSig::<3, 3>::with_validated(
            PubkeyHash::from_byte_array([0x66; 20]),
            pub_keys,
            [true, false, false],
        )
        .unwrap(),
        // swaps the key list
        StatefulMultiSig::<3, 3>::with_validated(
            destination(),
            [pub_keys[1], pub_keys[0], pub_keys[2]],
            [true, false, false],
        )
        .unwrap(),
    ];

    for tampered in tampered_states {
        let output = CovenantInstance::new(tampered, BALANCE).to_output().unwrap();
        let ctx = context_for(&multisig, BALANCE, &[output]);
        let err = multisig
            .add(0, &sign(&secret_keys[0], &ctx), &ctx, None)
            .unwrap_err();
        assert!(matches!(err, ContractError::OutputCommitmentMismatch { .. }));
    }

    // a successor under a different template (3-of-2) is just as foreign
    let other_template =
        StatefulMultiSig::<3, 2>::with_validated(destination(), pub_keys, [true, false, false]).unwrap();
    let output = CovenantInstance::new(other_template, BALANCE).to_output().unwrap();
    let ctx = context_for(&multisig, BALANCE, &[output]);
    assert!(multisig.add(0, &sign(&secret_keys[0], &ctx), &ctx, None).is_err());
}

#[test]
fn test_add_with_refund_and_change() {
    let (secret_keys, pub_keys) = participants::<3>();
    let multisig = DefaultMultiSig::new(destination(), pub_keys).unwrap();
    let refunded = Amount::from_sat(15_000);
    let change = commitment::p2pkh(&PubkeyHash::from_byte_array([0xcc; 20]), Amount::from_sat(500));

    let next = multisig.expected_add_output(2, refunded).unwrap();
    let ctx = context_for(&multisig, BALANCE, &[next, change.clone()]).with_change(change);
    let successor = multisig
        .add(2, &sign(&secret_keys[2], &ctx), &ctx, Some(refunded))
        .unwrap();
    assert_eq!(successor.validated(), &[false, false, true]);

    // the refunded balance is part of the commitment
    assert!(multisig
        .add(2, &sign(&secret_keys[2], &ctx), &ctx, None)
        .is_err());
}

#[test]
fn test_add_after_threshold_rejected() {
    let (secret_keys, pub_keys) = participants::<3>();
    let reached = DefaultMultiSig::with_validated(destination(), pub_keys, [true, true, false]).unwrap();
    let next = CovenantInstance::new(reached.clone(), BALANCE).to_output().unwrap();
    let ctx = context_for(&reached, BALANCE, &[next]);
    let err = reached
        .add(2, &sign(&secret_keys[2], &ctx), &ctx, None)
        .unwrap_err();
    assert!(matches!(err, ContractError::ThresholdAlreadyReached { need: 2 }));
}
