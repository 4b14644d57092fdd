use rand::{Rng as RandRng, rngs::StdRng};

use crate::engine::request::GeneratorParams;
use crate::error::{Error, Result};

/// Picks the next token from a row of logits. Greedy argmax unless the
/// request asked for sampling; sampling applies temperature then draws from
/// the top-p nucleus.
pub fn select_next_token(
    logits: &[f32],
    params: &GeneratorParams,
    rng: &mut StdRng,
) -> Result<u32> {
    if logits.is_empty() {
        return Err(Error::EngineStep { request_id: None, reason: "empty logits row".into() });
    }
    if !params.do_sample || params.temperature == 0.0 {
        return Ok(argmax(logits));
    }
    if !(0.0..=1.0).contains(&params.top_p) {
        return Err(Error::EngineStep {
            request_id: None,
            reason: format!("top_p must be between 0.0 and 1.0, got {}", params.top_p),
        });
    }
    Ok(sample_top_p(logits, params.temperature, params.top_p, rng))
}

fn argmax(logits: &[f32]) -> u32 {
    let mut best = 0usize;
    for (i, &value) in logits.iter().enumerate() {
        if value > logits[best] {
            best = i;
        }
    }
    best as u32
}

fn sample_top_p(logits: &[f32], temperature: f32, top_p: f32, rng: &mut StdRng) -> u32 {
    let t = if temperature <= 0.0 { 1e-6 } else { temperature };
    let mut max_logit = f32::NEG_INFINITY;
    for &v in logits {
        if v > max_logit {
            max_logit = v;
        }
    }
    // Stabilize with max subtraction before the softmax.
    let mut probs: Vec<f32> = logits.iter().map(|&z| ((z - max_logit) / t).exp()).collect();
    let sum: f32 = probs.iter().sum();
    if sum <= 0.0 {
        return argmax(logits);
    }
    for p in &mut probs {
        *p /= sum;
    }

    let mut indices: Vec<usize> = (0..probs.len()).collect();
    indices.sort_by(|&i, &j| probs[j].partial_cmp(&probs[i]).unwrap_or(std::cmp::Ordering::Equal));

    // Nucleus: highest-probability tokens up to the top_p cumulative mass.
    let mut nucleus: Vec<(usize, f32)> = Vec::new();
    let mut cumulative = 0.0_f32;
    for &i in &indices {
        let p = probs[i];
        nucleus.push((i, p));
        cumulative += p;
        if cumulative >= top_p {
            break;
        }
    }

    let nucleus_mass: f32 = nucleus.iter().map(|(_, p)| *p).sum();
    let mut draw = rng.r#gen::<f32>() * nucleus_mass.max(1e-8);
    for (i, p) in nucleus {
        if draw <= p {
            return i as u32;
        }
        draw -= p;
    }
    indices[0] as u32
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn greedy_params() -> GeneratorParams {
        GeneratorParams::default()
    }

    #[test]
    fn greedy_picks_the_argmax() {
        let mut rng = StdRng::seed_from_u64(0);
        let logits = vec![0.1, 2.5, -1.0, 0.3];
        let token = select_next_token(&logits, &greedy_params(), &mut rng).unwrap();
        assert_eq!(token, 1);
    }

    #[test]
    fn zero_temperature_forces_greedy_even_when_sampling() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut params = greedy_params();
        params.do_sample = true;
        params.temperature = 0.0;
        let logits = vec![0.0, 0.0, 5.0];
        assert_eq!(select_next_token(&logits, &params, &mut rng).unwrap(), 2);
    }

    #[test]
    fn sampling_is_deterministic_for_a_fixed_seed() {
        let mut params = greedy_params();
        params.do_sample = true;
        params.temperature = 0.8;
        params.top_p = 0.9;
        let logits = vec![1.0, 0.9, 0.8, 0.1, -2.0];

        let mut first_rng = StdRng::seed_from_u64(42);
        let mut second_rng = StdRng::seed_from_u64(42);
        let first = select_next_token(&logits, &params, &mut first_rng).unwrap();
        let second = select_next_token(&logits, &params, &mut second_rng).unwrap();
        assert_eq!(first, second);
        assert!((first as usize) < logits.len());
    }

    #[test]
    fn rejects_empty_logits_and_bad_top_p() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(select_next_token(&[], &greedy_params(), &mut rng).is_err());

        let mut params = greedy_params();
        params.do_sample = true;
        params.top_p = 1.5;
        assert!(select_next_token(&[0.0], &params, &mut rng).is_err());
    }
}
