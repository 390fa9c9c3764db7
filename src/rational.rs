//! Exact rational arithmetic
//!
//! # What this module is for
//! Every coefficient that flows through the constraint builder, the LP
//! oracle, and a statement's schedule matrix must be *exact* — the width
//! invariant (`CST_WIDTH` columns, see [`crate::cst`]) and the scale-shift
//! step both assume no rounding error accumulates across a long chain of
//! feasibility queries. We use [`num_rational::BigRational`] (`Ratio<BigInt>`)
//! rather than a fixed-width rational so that pathological coefficient
//! growth across many colour rounds cannot silently overflow.
//!
//! The LP backend itself (`good_lp`/`microlp`, see [`crate::lp`]) works in
//! `f64`. [`rationalize`] is the one place that floating-point output is
//! converted back to an exact value, bounded by the same coefficient bound
//! used to build the constraint system in the first place.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

/// Exact rational used for every coefficient, bound, and schedule entry.
pub type Rat = BigRational;

/// `0` as a [`Rat`].
#[inline]
pub fn zero() -> Rat {
    Rat::zero()
}

/// `1` as a [`Rat`].
#[inline]
pub fn one() -> Rat {
    Rat::one()
}

/// Build an exact rational from a plain integer.
#[inline]
pub fn int(n: i64) -> Rat {
    Rat::from_integer(BigInt::from(n))
}

/// Snap a floating-point LP witness component to the nearest rational whose
/// denominator divides `max_den` (continued-fraction rounding).
///
/// `good_lp`'s simplex backends report solutions in `f64`. Every feasible
/// point of a [`crate::cst::coeff_bounding_constraints`] system lies on the
/// integer lattice bounded by the coefficient bound `cst_const`, so
/// `max_den = 1` is sufficient whenever the oracle solves an *integer*
/// program; we keep `max_den` as a parameter so [`crate::lp::LpOracle::lexmin`]
/// (which must be integer-exact) and
/// [`crate::lp::LpOracle::feasibility_lexmin`] (which may legitimately
/// return fractional witnesses used only for a parallelism test) share one
/// implementation.
pub fn rationalize(x: f64, max_den: i64) -> Rat {
    if !x.is_finite() {
        return zero();
    }
    if max_den <= 1 {
        return int(x.round() as i64);
    }
    // Continued-fraction convergents, standard best-rational-approximation
    // algorithm, stopped as soon as the denominator would exceed `max_den`.
    let sign = if x < 0.0 { -1i64 } else { 1 };
    let mut x = x.abs();
    let (mut h_prev, mut h_curr) = (0i64, 1i64);
    let (mut k_prev, mut k_curr) = (1i64, 0i64);
    for _ in 0..64 {
        let a = x.floor();
        let a_i = a as i64;
        let h_next = a_i.saturating_mul(h_curr).saturating_add(h_prev);
        let k_next = a_i.saturating_mul(k_curr).saturating_add(k_prev);
        if k_next > max_den || k_next <= 0 {
            break;
        }
        h_prev = h_curr;
        h_curr = h_next;
        k_prev = k_curr;
        k_curr = k_next;
        let frac = x - a;
        if frac.abs() < 1e-12 {
            break;
        }
        x = 1.0 / frac;
        if !x.is_finite() {
            break;
        }
    }
    if k_curr == 0 {
        return zero();
    }
    Rat::new(BigInt::from(sign * h_curr), BigInt::from(k_curr))
}

/// `true` iff `r` is an exact integer.
#[inline]
pub fn is_integer(r: &Rat) -> bool {
    r.is_integer()
}

/// Round `r` to the nearest `i64`, saturating on overflow. Used only for
/// sizes/offsets derived from coefficients that are known by construction
/// to be small (coefficient bounds, loop depths).
pub fn to_i64_saturating(r: &Rat) -> i64 {
    let t = r.trunc();
    let (num, den) = (t.numer(), t.denom());
    if den.is_zero() {
        return 0;
    }
    let q = num / den;
    q.to_string().parse::<i64>().unwrap_or(if q.is_negative() { i64::MIN } else { i64::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rationalize_snaps_to_integers_when_bound_is_one() {
        assert_eq!(rationalize(2.0000001, 1), int(2));
        assert_eq!(rationalize(-3.0, 1), int(-3));
    }

    #[test]
    fn rationalize_recovers_simple_fractions() {
        let r = rationalize(0.5, 8);
        assert_eq!(r, Rat::new(BigInt::from(1), BigInt::from(2)));
    }

    #[test]
    fn zero_and_one_are_additive_multiplicative_identities() {
        assert_eq!(&zero() + &one(), one());
        assert_eq!(&one() * &int(5), int(5));
    }
}
