use proptest::prelude::*;
use tokio::runtime::{Builder, Runtime};

use secretshare::crypto::{
    kdf::KdfParams,
    pin::{Pin, PinPolicy, MIN_PIN},
    pin_cipher::PinCipher,
};

fn runtime() -> Runtime {
    Builder::new_current_thread().enable_all().build().unwrap()
}

fn cipher() -> PinCipher {
    PinCipher::new(&[42u8; 32], KdfParams::fast(), 2)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn decrypt_inverts_encrypt(
        payload in proptest::collection::vec(any::<u8>(), 0..512),
        pin in MIN_PIN..1_000_000_000u32,
    ) {
        let rt = runtime();
        let cipher = cipher();
        let sealed = rt.block_on(cipher.encrypt(&payload, Pin::new(pin))).unwrap();
        let opened = rt.block_on(cipher.decrypt(&sealed, Pin::new(pin))).unwrap();
        prop_assert_eq!(opened.as_slice(), payload.as_slice());
    }

    #[test]
    fn other_pins_never_decrypt(
        payload in proptest::collection::vec(any::<u8>(), 1..128),
        pin in MIN_PIN..1_000_000u32,
        other in 0..1_000_000u32,
    ) {
        prop_assume!(pin != other);
        let rt = runtime();
        let cipher = cipher();
        let sealed = rt.block_on(cipher.encrypt(&payload, Pin::new(pin))).unwrap();
        prop_assert!(rt.block_on(cipher.decrypt(&sealed, Pin::new(other))).is_err());
    }

    #[test]
    fn zero_padded_candidates_parse_to_the_same_pin(n in 0..1_000_000_000u32, pad in 0usize..8) {
        let candidate = format!("{}{}", "0".repeat(pad), n);
        prop_assert_eq!(Pin::parse(&candidate), Some(Pin::new(n)));
        prop_assert_eq!(Pin::parse(&format!("  {candidate}\t")), Some(Pin::new(n)));
    }

    #[test]
    fn non_digits_never_parse(s in "[0-9]{0,4}[^0-9\\s][0-9]{0,4}") {
        prop_assert_eq!(Pin::parse(&s), None);
    }

    #[test]
    fn generated_pins_stay_in_range(digits in 3u32..=9) {
        let policy = PinPolicy::new(digits).unwrap();
        let pin = policy.generate();
        prop_assert!(pin.value() >= MIN_PIN);
        prop_assert_eq!(pin.canonical().len(), digits as usize);
    }
}
