//! Agreement-beyond-chance metrics.

#[cfg(test)]
use std::collections::HashSet;
#[cfg(test)]
use std::hash::Hash;

/// Cohen's kappa between two label sequences of equal length.
///
/// Returns 0.0 for empty or mismatched input and 1.0 when chance agreement is total.
/// Reference for the marginal form in [`ConfusionMatrix::kappa`](super::ConfusionMatrix::kappa).
#[cfg(test)]
pub(crate) fn cohens_kappa<T: Eq + Hash>(a: &[T], b: &[T]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let n = a.len() as f64;
    let agree = a.iter().zip(b).filter(|(x, y)| x == y).count() as f64;
    let po = agree / n;

    let categories: HashSet<&T> = a.iter().chain(b).collect();
    let pe: f64 = categories
        .iter()
        .map(|&cat| {
            let count_a = a.iter().filter(|x| *x == cat).count() as f64;
            let count_b = b.iter().filter(|x| *x == cat).count() as f64;
            (count_a / n) * (count_b / n)
        })
        .sum();

    kappa(po, pe)
}

/// `(po - pe) / (1 - pe)`, defined as 1.0 when `pe` is 1.
pub fn kappa(observed: f64, expected: f64) -> f64 {
    if (1.0 - expected).abs() < f64::EPSILON {
        return 1.0;
    }
    (observed - expected) / (1.0 - expected)
}

/// Interpret a kappa score (Landis & Koch bands).
pub fn interpret_kappa(kappa: f64) -> &'static str {
    if kappa < 0.0 {
        "Poor"
    } else if kappa < 0.20 {
        "Slight"
    } else if kappa < 0.40 {
        "Fair"
    } else if kappa < 0.60 {
        "Moderate"
    } else if kappa < 0.80 {
        "Substantial"
    } else {
        "Almost Perfect"
    }
}
