//! 計測・評価用のユーティリティ群。
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::schema::{LabelType, RawLabel};

/// 合成データの基準点 (ワシントン D.C. 付近)。
const ORIGIN: (f64, f64) = (38.9072, -77.0369);
/// 特徴点を散らばらせる範囲 (度)。おおよそ 2km 四方。
const SPREAD_DEGREES: f64 = 0.02;
/// 同一特徴点に対するアノテーターごとのブレ (度)。おおよそ 3m。
const JITTER_DEGREES: f64 = 0.000_03;

/// 複数アノテーターが同じルートを歩いた想定の合成ラベルを生成する。
///
/// # Arguments
/// * `features` - 実在する特徴点の数
/// * `annotators` - ルートを歩いたアノテーター数。各特徴点はおよそ 8 割の確率で各アノテーターに観測される
/// * `seed` - 乱数シード
#[must_use]
pub fn synthetic_rows(features: usize, annotators: usize, seed: u64) -> Vec<RawLabel> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(features * annotators.max(1));
    let mut next_id = 1_i64;

    for _ in 0..features {
        let label_type = LabelType::ALL[rng.random_range(0..LabelType::ALL.len())];
        let lat = ORIGIN.0 + rng.random_range(-SPREAD_DEGREES..SPREAD_DEGREES);
        let lng = ORIGIN.1 + rng.random_range(-SPREAD_DEGREES..SPREAD_DEGREES);
        let severity = rng.random_range(1..=5_u8);
        let temporary = rng.random_bool(0.1);

        for annotator in 0..annotators.max(1) {
            if annotators > 1 && !rng.random_bool(0.8) {
                continue;
            }
            rows.push(RawLabel {
                label_id: next_id,
                label_type: label_type.as_str().to_string(),
                lat: Some(lat + rng.random_range(-JITTER_DEGREES..JITTER_DEGREES)),
                lng: Some(lng + rng.random_range(-JITTER_DEGREES..JITTER_DEGREES)),
                annotator_id: format!("annotator-{annotator}"),
                severity: rng.random_bool(0.9).then(|| {
                    severity
                        .saturating_add_signed(rng.random_range(-1..=1_i8))
                        .clamp(1, 5)
                }),
                temporary: rng.random_bool(0.7).then_some(temporary),
            });
            next_id += 1;
        }
    }

    rows
}

/// 範囲外経度を含む行を `every` 件ごとに混ぜ込む。検証段のベンチ・テスト向け。
#[must_use]
pub fn with_invalid_longitudes(mut rows: Vec<RawLabel>, every: usize) -> Vec<RawLabel> {
    if every == 0 {
        return rows;
    }
    for row in rows.iter_mut().step_by(every) {
        row.lng = Some(1.2e14);
    }
    rows
}
