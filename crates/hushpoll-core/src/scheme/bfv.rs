//! Reference BFV-style additive homomorphic scheme.
//!
//! Textbook BFV restricted to what the questionnaire system uses:
//! encryption of batched integer vectors and component-wise ciphertext
//! addition. Multiplication, relinearization, and modulus switching are
//! deliberately absent.
//!
//! - Secret key: uniform ternary polynomial `s` in `{-1, 0, 1}^d`.
//! - Public key: `p1 = a` uniform, `p0 = -(a*s + e)` with small error `e`.
//! - Encrypt: `c0 = p0*u + e1 + delta*m`, `c1 = p1*u + e2` where
//!   `delta = q / t` and `u, e1, e2` are sampled from the triangle
//!   distribution on `{-1, 0, 1}`.
//! - Add: component-wise polynomial addition mod `q` (associative and
//!   commutative by construction).
//! - Decrypt: `m = round(t * (c0 + c1*s) / q) mod t`.
//!
//! Batching maps an integer vector to plaintext slots by evaluating at the
//! odd powers of a primitive `2d`-th root of unity mod `t` (the roots of
//! `x^d + 1` over `Z_t`), so slot-wise sums commute with ring addition.
//! The plaintext modulus bounds per-slot counts: with `t = 17`, per-option
//! tallies wrap past 16 votes, matching the reference deployment.
//!
//! All ring arithmetic is exact integer arithmetic; products are
//! accumulated in `i128` before reduction mod `q`.

use rand::Rng;

use super::{CipherScheme, KeyPair, SchemeError};
use crate::model::CryptoParams;
use crate::wire::{CiphertextWire, PolynomialWire, PublicKeyWire, SecretKeyWire};

/// Reference BFV scheme instance for one parameter set.
#[derive(Debug, Clone)]
pub struct BfvScheme {
    params: CryptoParams,
    /// Plaintext scaling factor `q / t`.
    delta: u64,
    /// Powers `psi^0 .. psi^(2d-1)` of a primitive `2d`-th root of unity
    /// mod `t`.
    psi_pows: Vec<u64>,
    /// Powers of `psi^-1` mod `t`.
    psi_inv_pows: Vec<u64>,
    /// `d^-1` mod `t`, applied during encoding.
    degree_inv: u64,
}

impl BfvScheme {
    /// Builds a scheme for the given parameters.
    ///
    /// Requires `poly_degree` to be a power of two and the plaintext
    /// modulus to admit a primitive `2d`-th root of unity (i.e.
    /// `t ≡ 1 mod 2d`), which is what makes exact slot batching possible.
    pub fn new(params: CryptoParams) -> Result<Self, SchemeError> {
        let d = params.poly_degree;
        let t = params.plain_modulus;
        let q = params.ciph_modulus;

        if d < 2 || !d.is_power_of_two() {
            return Err(SchemeError::InvalidParameters(format!(
                "ring degree must be a power of two >= 2, got {d}"
            )));
        }
        if t < 2 || q <= t {
            return Err(SchemeError::InvalidParameters(format!(
                "moduli must satisfy 2 <= t < q, got t={t} q={q}"
            )));
        }
        let order = 2 * d as u64;
        if (t - 1) % order != 0 {
            return Err(SchemeError::InvalidParameters(format!(
                "no {order}-th root of unity exists mod {t}"
            )));
        }

        let psi = find_root_of_unity(order, t).ok_or_else(|| {
            SchemeError::InvalidParameters(format!(
                "could not find a primitive {order}-th root of unity mod {t}"
            ))
        })?;
        let psi_inv = mod_inverse(psi, t).ok_or_else(|| {
            SchemeError::InvalidParameters(format!("{psi} is not invertible mod {t}"))
        })?;
        let degree_inv = mod_inverse(d as u64 % t, t).ok_or_else(|| {
            SchemeError::InvalidParameters(format!("degree {d} is not invertible mod {t}"))
        })?;

        let psi_pows = (0..order).map(|i| mod_pow(psi, i, t)).collect();
        let psi_inv_pows = (0..order).map(|i| mod_pow(psi_inv, i, t)).collect();

        Ok(Self {
            params,
            delta: q / t,
            psi_pows,
            psi_inv_pows,
            degree_inv,
        })
    }

    /// Keypair generation with a caller-supplied RNG, for deterministic
    /// tests. Production callers use [`CipherScheme::generate_keypair`].
    pub fn keypair_with_rng<R: Rng>(&self, rng: &mut R) -> KeyPair {
        let d = self.params.poly_degree;
        let q = self.params.ciph_modulus;

        let secret = sample_ternary(rng, d, q);
        let a = sample_uniform(rng, d, q);
        let e = sample_triangle(rng, d, q);

        // p0 = -(a*s + e), p1 = a
        let p0 = poly_neg(&poly_add(&poly_mul(&a, &secret, q), &e, q), q);

        KeyPair {
            public: PublicKeyWire {
                p0: to_wire(d, p0),
                p1: to_wire(d, a),
            },
            secret: SecretKeyWire {
                ring_degree: d,
                coeffs: secret,
            },
        }
    }

    /// Encryption with a caller-supplied RNG.
    pub fn encrypt_with_rng<R: Rng>(
        &self,
        plain: &PolynomialWire,
        public_key: &PublicKeyWire,
        rng: &mut R,
    ) -> Result<CiphertextWire, SchemeError> {
        let d = self.params.poly_degree;
        let q = self.params.ciph_modulus;
        check_degree(plain, d)?;
        check_degree(&public_key.p0, d)?;
        check_degree(&public_key.p1, d)?;

        let scaled: Vec<i64> = plain
            .coeffs
            .iter()
            .map(|&c| mul_mod(normalize(c, q), self.delta, q))
            .collect();

        let u = sample_triangle(rng, d, q);
        let e1 = sample_triangle(rng, d, q);
        let e2 = sample_triangle(rng, d, q);

        let p0: Vec<i64> = public_key.p0.coeffs.iter().map(|&c| normalize(c, q)).collect();
        let p1: Vec<i64> = public_key.p1.coeffs.iter().map(|&c| normalize(c, q)).collect();

        let c0 = poly_add(&poly_add(&e1, &poly_mul(&p0, &u, q), q), &scaled, q);
        let c1 = poly_add(&e2, &poly_mul(&p1, &u, q), q);

        Ok(CiphertextWire {
            c0: to_wire(d, c0),
            c1: to_wire(d, c1),
            scaling_factor: self.delta as i64,
            modulus: q as i64,
        })
    }

    fn check_ciphertext(&self, ct: &CiphertextWire, which: &str) -> Result<(), SchemeError> {
        let d = self.params.poly_degree;
        check_degree(&ct.c0, d)?;
        check_degree(&ct.c1, d)?;
        if ct.modulus != self.params.ciph_modulus as i64 {
            return Err(SchemeError::CiphertextMismatch(format!(
                "{which} was produced under modulus {}, scheme uses {}",
                ct.modulus, self.params.ciph_modulus
            )));
        }
        Ok(())
    }
}

impl CipherScheme for BfvScheme {
    fn params(&self) -> CryptoParams {
        self.params
    }

    fn generate_keypair(&self) -> Result<KeyPair, SchemeError> {
        Ok(self.keypair_with_rng(&mut rand::thread_rng()))
    }

    fn encode(&self, values: &[u64]) -> Result<PolynomialWire, SchemeError> {
        let d = self.params.poly_degree;
        let t = self.params.plain_modulus;
        if values.len() != d {
            return Err(SchemeError::LengthMismatch {
                expected: d,
                got: values.len(),
            });
        }

        // Inverse of the slot evaluation below: interpolation through the
        // odd powers of psi, scaled by d^-1.
        let order = 2 * d;
        let mut coeffs = Vec::with_capacity(d);
        for j in 0..d {
            let mut acc: u64 = 0;
            for (i, &v) in values.iter().enumerate() {
                let exp = ((2 * i + 1) * j) % order;
                acc = (acc + mul_mod_t(v % t, self.psi_inv_pows[exp], t)) % t;
            }
            coeffs.push(mul_mod_t(acc, self.degree_inv, t) as i64);
        }
        Ok(PolynomialWire {
            ring_degree: d,
            coeffs,
        })
    }

    fn decode(&self, plain: &PolynomialWire) -> Result<Vec<u64>, SchemeError> {
        let d = self.params.poly_degree;
        let t = self.params.plain_modulus;
        check_degree(plain, d)?;

        // Slot i is the polynomial evaluated at psi^(2i+1), the i-th root
        // of x^d + 1 over Z_t. Evaluation is linear, so slot values add
        // when plaintexts add.
        let order = 2 * d;
        let mut values = Vec::with_capacity(d);
        for i in 0..d {
            let mut acc: u64 = 0;
            for (j, &c) in plain.coeffs.iter().enumerate() {
                let c = c.rem_euclid(t as i64) as u64;
                let exp = ((2 * i + 1) * j) % order;
                acc = (acc + mul_mod_t(c, self.psi_pows[exp], t)) % t;
            }
            values.push(acc);
        }
        Ok(values)
    }

    fn encrypt(
        &self,
        plain: &PolynomialWire,
        public_key: &PublicKeyWire,
    ) -> Result<CiphertextWire, SchemeError> {
        self.encrypt_with_rng(plain, public_key, &mut rand::thread_rng())
    }

    fn add(&self, a: &CiphertextWire, b: &CiphertextWire) -> Result<CiphertextWire, SchemeError> {
        self.check_ciphertext(a, "left operand")?;
        self.check_ciphertext(b, "right operand")?;
        let d = self.params.poly_degree;
        let q = self.params.ciph_modulus;

        let na = |p: &PolynomialWire| -> Vec<i64> {
            p.coeffs.iter().map(|&c| normalize(c, q)).collect()
        };
        Ok(CiphertextWire {
            c0: to_wire(d, poly_add(&na(&a.c0), &na(&b.c0), q)),
            c1: to_wire(d, poly_add(&na(&a.c1), &na(&b.c1), q)),
            scaling_factor: self.delta as i64,
            modulus: q as i64,
        })
    }

    fn decrypt(
        &self,
        ciphertext: &CiphertextWire,
        secret_key: &SecretKeyWire,
    ) -> Result<PolynomialWire, SchemeError> {
        let d = self.params.poly_degree;
        let t = self.params.plain_modulus;
        let q = self.params.ciph_modulus;
        self.check_ciphertext(ciphertext, "ciphertext")?;
        if secret_key.coeffs.len() != d || secret_key.ring_degree != d {
            return Err(SchemeError::LengthMismatch {
                expected: d,
                got: secret_key.coeffs.len(),
            });
        }

        let c0: Vec<i64> = ciphertext.c0.coeffs.iter().map(|&c| normalize(c, q)).collect();
        let c1: Vec<i64> = ciphertext.c1.coeffs.iter().map(|&c| normalize(c, q)).collect();
        let s: Vec<i64> = secret_key.coeffs.iter().map(|&c| normalize(c, q)).collect();

        let noisy = poly_add(&c0, &poly_mul(&c1, &s, q), q);

        // m_j = round(t * x_j / q) mod t, computed exactly in integers.
        let coeffs = noisy
            .iter()
            .map(|&x| {
                let num = u128::from(t) * x as u128 + u128::from(q) / 2;
                ((num / u128::from(q)) % u128::from(t)) as i64
            })
            .collect();
        Ok(PolynomialWire {
            ring_degree: d,
            coeffs,
        })
    }
}

// ---------------------------------------------------------------------------
// Ring arithmetic. Coefficients are kept reduced in [0, q).
// ---------------------------------------------------------------------------

fn normalize(c: i64, q: u64) -> i64 {
    c.rem_euclid(q as i64)
}

fn to_wire(degree: usize, coeffs: Vec<i64>) -> PolynomialWire {
    PolynomialWire {
        ring_degree: degree,
        coeffs,
    }
}

fn check_degree(poly: &PolynomialWire, degree: usize) -> Result<(), SchemeError> {
    if poly.coeffs.len() != degree || poly.ring_degree != degree {
        return Err(SchemeError::LengthMismatch {
            expected: degree,
            got: poly.coeffs.len(),
        });
    }
    Ok(())
}

fn poly_add(a: &[i64], b: &[i64], q: u64) -> Vec<i64> {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| ((x as i128 + y as i128).rem_euclid(q as i128)) as i64)
        .collect()
}

fn poly_neg(a: &[i64], q: u64) -> Vec<i64> {
    a.iter()
        .map(|&x| ((-(x as i128)).rem_euclid(q as i128)) as i64)
        .collect()
}

/// Negacyclic convolution in `Z_q[x]/(x^d + 1)`. Quadratic, which is fine
/// for the small ring degrees this system runs at.
fn poly_mul(a: &[i64], b: &[i64], q: u64) -> Vec<i64> {
    let d = a.len();
    let mut acc = vec![0i128; d];
    for (i, &ai) in a.iter().enumerate() {
        for (j, &bj) in b.iter().enumerate() {
            let prod = ai as i128 * bj as i128 % q as i128;
            let k = i + j;
            if k < d {
                acc[k] += prod;
            } else {
                acc[k - d] -= prod;
            }
        }
    }
    acc.into_iter()
        .map(|x| x.rem_euclid(q as i128) as i64)
        .collect()
}

fn mul_mod(a: i64, b: u64, q: u64) -> i64 {
    (a as i128 * b as i128).rem_euclid(q as i128) as i64
}

fn mul_mod_t(a: u64, b: u64, t: u64) -> u64 {
    (u128::from(a) * u128::from(b) % u128::from(t)) as u64
}

fn mod_pow(base: u64, mut exp: u64, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let m = u128::from(modulus);
    let mut result: u128 = 1;
    let mut b = u128::from(base % modulus);
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * b % m;
        }
        exp >>= 1;
        b = b * b % m;
    }
    result as u64
}

fn mod_inverse(a: u64, m: u64) -> Option<u64> {
    let (mut old_r, mut r) = (i128::from(a % m), i128::from(m));
    let (mut old_s, mut s) = (1i128, 0i128);
    while r != 0 {
        let quotient = old_r / r;
        (old_r, r) = (r, old_r - quotient * r);
        (old_s, s) = (s, old_s - quotient * s);
    }
    if old_r != 1 {
        return None;
    }
    Some(old_s.rem_euclid(i128::from(m)) as u64)
}

/// Finds a primitive `order`-th root of unity mod `modulus` by exhaustive
/// search, mirroring the client-side key tooling.
fn find_root_of_unity(order: u64, modulus: u64) -> Option<u64> {
    if (modulus - 1) % order != 0 {
        return None;
    }
    for g in 2..modulus {
        let candidate = mod_pow(g, (modulus - 1) / order, modulus);
        if mod_pow(candidate, order, modulus) != 1 {
            continue;
        }
        let primitive = (1..order).all(|i| mod_pow(candidate, i, modulus) != 1);
        if primitive {
            return Some(candidate);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Sampling. Coefficients are returned already reduced into [0, q).
// ---------------------------------------------------------------------------

fn sample_uniform<R: Rng>(rng: &mut R, degree: usize, q: u64) -> Vec<i64> {
    (0..degree).map(|_| rng.gen_range(0..q) as i64).collect()
}

/// Uniform ternary: each coefficient in {-1, 0, 1} with equal probability.
fn sample_ternary<R: Rng>(rng: &mut R, degree: usize, q: u64) -> Vec<i64> {
    (0..degree)
        .map(|_| match rng.gen_range(0u8..3) {
            0 => q as i64 - 1,
            1 => 1,
            _ => 0,
        })
        .collect()
}

/// Triangle distribution on {-1, 0, 1}: probabilities 1/4, 1/2, 1/4.
fn sample_triangle<R: Rng>(rng: &mut R, degree: usize, q: u64) -> Vec<i64> {
    (0..degree)
        .map(|_| match rng.gen_range(0u8..4) {
            0 => q as i64 - 1,
            1 => 1,
            _ => 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn scheme() -> BfvScheme {
        BfvScheme::new(CryptoParams::default()).expect("default params are valid")
    }

    fn one_hot(index: usize) -> Vec<u64> {
        let mut v = vec![0u64; 8];
        v[index] = 1;
        v
    }

    #[test]
    fn rejects_non_power_of_two_degree() {
        let params = CryptoParams {
            poly_degree: 6,
            ..CryptoParams::default()
        };
        assert!(BfvScheme::new(params).is_err());
    }

    #[test]
    fn rejects_modulus_without_root_of_unity() {
        // 19 - 1 = 18 is not divisible by 16.
        let params = CryptoParams {
            plain_modulus: 19,
            ..CryptoParams::default()
        };
        assert!(BfvScheme::new(params).is_err());
    }

    #[test]
    fn encode_decode_round_trips_zero_vector() {
        let s = scheme();
        let zero = vec![0u64; 8];
        let plain = s.encode(&zero).unwrap();
        assert_eq!(s.decode(&plain).unwrap(), zero);
    }

    #[test]
    fn encode_decode_round_trips_every_one_hot_vector() {
        let s = scheme();
        for i in 0..8 {
            let v = one_hot(i);
            let plain = s.encode(&v).unwrap();
            assert_eq!(s.decode(&plain).unwrap(), v, "one-hot index {i}");
        }
    }

    #[test]
    fn encode_decode_round_trips_arbitrary_vector() {
        let s = scheme();
        let v = vec![3, 1, 4, 1, 5, 9, 2, 6];
        let plain = s.encode(&v).unwrap();
        assert_eq!(s.decode(&plain).unwrap(), v);
    }

    #[test]
    fn encoding_is_linear_over_slots() {
        let s = scheme();
        let t = s.params().plain_modulus as i64;
        let a = vec![1, 0, 0, 0, 0, 0, 0, 0];
        let b = vec![0, 1, 0, 0, 0, 1, 0, 0];
        let pa = s.encode(&a).unwrap();
        let pb = s.encode(&b).unwrap();
        let sum = PolynomialWire {
            ring_degree: 8,
            coeffs: pa
                .coeffs
                .iter()
                .zip(&pb.coeffs)
                .map(|(&x, &y)| (x + y).rem_euclid(t))
                .collect(),
        };
        assert_eq!(s.decode(&sum).unwrap(), vec![1, 1, 0, 0, 0, 1, 0, 0]);
    }

    #[test]
    fn encrypt_decrypt_round_trips() {
        let s = scheme();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let keys = s.keypair_with_rng(&mut rng);
        for i in 0..8 {
            let plain = s.encode(&one_hot(i)).unwrap();
            let ct = s.encrypt_with_rng(&plain, &keys.public, &mut rng).unwrap();
            let decrypted = s.decrypt(&ct, &keys.secret).unwrap();
            assert_eq!(s.decode(&decrypted).unwrap(), one_hot(i));
        }
    }

    #[test]
    fn homomorphic_sum_of_three_ballots() {
        let s = scheme();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let keys = s.keypair_with_rng(&mut rng);

        let ballots = [one_hot(0), one_hot(1), one_hot(3)];
        let mut acc: Option<CiphertextWire> = None;
        for ballot in &ballots {
            let plain = s.encode(ballot).unwrap();
            let ct = s.encrypt_with_rng(&plain, &keys.public, &mut rng).unwrap();
            acc = Some(match acc {
                None => ct,
                Some(prev) => s.add(&prev, &ct).unwrap(),
            });
        }

        let decrypted = s.decrypt(&acc.unwrap(), &keys.secret).unwrap();
        assert_eq!(
            s.decode(&decrypted).unwrap(),
            vec![1, 1, 0, 1, 0, 0, 0, 0]
        );
    }

    #[test]
    fn homomorphic_sum_survives_many_additions() {
        let s = scheme();
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let keys = s.keypair_with_rng(&mut rng);

        // 16 ballots for option 2: the slot holds 16, just below the
        // plaintext modulus.
        let plain = s.encode(&one_hot(2)).unwrap();
        let mut acc = s.encrypt_with_rng(&plain, &keys.public, &mut rng).unwrap();
        for _ in 0..15 {
            let ct = s.encrypt_with_rng(&plain, &keys.public, &mut rng).unwrap();
            acc = s.add(&acc, &ct).unwrap();
        }
        let decoded = s
            .decode(&s.decrypt(&acc, &keys.secret).unwrap())
            .unwrap();
        assert_eq!(decoded, vec![0, 0, 16, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn add_rejects_foreign_modulus() {
        let s = scheme();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let keys = s.keypair_with_rng(&mut rng);
        let plain = s.encode(&one_hot(0)).unwrap();
        let ct = s.encrypt_with_rng(&plain, &keys.public, &mut rng).unwrap();
        let mut foreign = ct.clone();
        foreign.modulus = 1234;
        assert!(matches!(
            s.add(&ct, &foreign),
            Err(SchemeError::CiphertextMismatch(_))
        ));
    }

    #[test]
    fn decrypt_rejects_wrong_degree_key() {
        let s = scheme();
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let keys = s.keypair_with_rng(&mut rng);
        let plain = s.encode(&one_hot(0)).unwrap();
        let ct = s.encrypt_with_rng(&plain, &keys.public, &mut rng).unwrap();
        let bad_key = SecretKeyWire {
            ring_degree: 4,
            coeffs: vec![0, 1, 0, 1],
        };
        assert!(s.decrypt(&ct, &bad_key).is_err());
    }
}
