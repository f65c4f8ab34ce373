use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tessera_order::{
    CoExpRequest, OrderError, OrderRequest, OrderType, Parity, TokenPair, combine_fragments,
    decrypt_fragment, encrypt_fragment, fragment,
};
use tessera_threshold::{LocalPodMember, reconstruction_threshold};

fn request() -> OrderRequest {
    OrderRequest {
        parity: Some(Parity::Buy),
        order_type: Some(OrderType::Limit),
        settlement: Some(1),
        expiry: Some(1_700_000_000),
        tokens: Some(TokenPair::new(1, 256)),
        price: Some(CoExpRequest::new("350", "2")),
        volume: Some(CoExpRequest::new("100", "0")),
        minimum_volume: Some(CoExpRequest::new("50", "0")),
        nonce: None,
    }
}

#[test]
fn members_jointly_recover_order() {
    let mut rng = ChaCha20Rng::seed_from_u64(42);
    let order = request().into_order(&mut rng).unwrap();
    let members: Vec<LocalPodMember> = (0..7).map(|_| LocalPodMember::generate(&mut rng)).collect();

    let n = members.len() as u32;
    let k = reconstruction_threshold(n);
    assert_eq!(k, 6);

    let encrypted: Vec<_> = fragment(&order, n, k, &mut rng)
        .unwrap()
        .iter()
        .zip(&members)
        .map(|(f, m)| encrypt_fragment(f, m.public_key.as_bytes(), &mut rng).unwrap())
        .collect();

    let opened: Vec<_> = encrypted
        .iter()
        .zip(&members)
        .map(|(e, m)| decrypt_fragment(e, m).unwrap())
        .collect();

    let recovered = combine_fragments(&opened[1..], k).unwrap();
    assert_eq!(recovered, order);
    assert_eq!(recovered.volume.value(), Some(100));
}

#[test]
fn member_cannot_open_neighbour_fragment() {
    let mut rng = ChaCha20Rng::seed_from_u64(43);
    let order = request().into_order(&mut rng).unwrap();
    let members: Vec<LocalPodMember> = (0..4).map(|_| LocalPodMember::generate(&mut rng)).collect();

    let fragments = fragment(&order, 4, 4, &mut rng).unwrap();
    let encrypted: Vec<_> = fragments
        .iter()
        .zip(&members)
        .map(|(f, m)| encrypt_fragment(f, m.public_key.as_bytes(), &mut rng).unwrap())
        .collect();

    for (i, e) in encrypted.iter().enumerate() {
        for (j, m) in members.iter().enumerate() {
            let result = decrypt_fragment(e, m);
            if i == j {
                assert_eq!(result.unwrap(), fragments[i]);
            } else {
                assert!(matches!(result, Err(OrderError::Encryption(_))));
            }
        }
    }
}

#[test]
fn below_threshold_recovery_fails() {
    let mut rng = ChaCha20Rng::seed_from_u64(44);
    let order = request().into_order(&mut rng).unwrap();
    let fragments = fragment(&order, 5, 4, &mut rng).unwrap();

    assert!(matches!(
        combine_fragments(&fragments[..3], 4),
        Err(OrderError::Threshold(_))
    ));
}
