//! 纯数值指标计算：EMA / MACD / RSI / ATR
//!
//! 所有函数输出长度与输入一致；前段值用简单均值作为指数递推的种子。
//! 无状态、确定性，空输入返回空结果。

/// 指数移动平均。种子 = 前 period 个值的简单均值，k = 2/(period+1)
pub fn ema(prices: &[f64], period: usize) -> Vec<f64> {
    let n = prices.len();
    if n == 0 || period == 0 {
        return Vec::new();
    }
    let mut out = vec![0.0; n];
    let k = 2.0 / (period as f64 + 1.0);

    let seed_len = period.min(n);
    let seed: f64 = prices[..seed_len].iter().sum::<f64>() / seed_len as f64;
    out[0] = seed;

    for i in 1..n {
        out[i] = prices[i] * k + out[i - 1] * (1.0 - k);
    }
    out
}

/// MACD 线 = EMA12 − EMA26，逐点
pub fn macd(prices: &[f64]) -> Vec<f64> {
    let ema12 = ema(prices, 12);
    let ema26 = ema(prices, 26);
    ema12
        .iter()
        .zip(ema26.iter())
        .map(|(a, b)| a - b)
        .collect()
}

/// 相对强弱指数，Wilder 平滑。首值固定 50，avg_loss=0 时输出 100
pub fn rsi(prices: &[f64], period: usize) -> Vec<f64> {
    let n = prices.len();
    if n < 2 || period == 0 {
        return vec![0.0; n];
    }
    let mut out = vec![0.0; n];
    out[0] = 50.0;

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    let init_len = period.min(n - 1);
    for i in 1..=init_len {
        let change = prices[i] - prices[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += change.abs();
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    out[init_len] = if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    for i in (init_len + 1)..n {
        let change = prices[i] - prices[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, change.abs())
        };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;

        out[i] = if avg_loss == 0.0 {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        };
    }

    // 前段回填首个计算值
    for i in 1..init_len {
        out[i] = out[init_len];
    }
    out
}

/// 平均真实波幅：TR = max(h−l, |h−prev_c|, |l−prev_c|)，再做 EMA 平滑
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    if n < 2 || period == 0 {
        return vec![0.0; n];
    }
    let mut tr = vec![0.0; n];
    tr[0] = highs[0] - lows[0];
    for i in 1..n {
        let hl = highs[i] - lows[i];
        let hc = (highs[i] - closes[i - 1]).abs();
        let lc = (lows[i] - closes[i - 1]).abs();
        tr[i] = hl.max(hc).max(lc);
    }
    ema(&tr, period)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_constant_series() {
        let prices = vec![5.0; 40];
        for v in ema(&prices, 12) {
            assert!((v - 5.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_ema_empty() {
        assert!(ema(&[], 12).is_empty());
    }

    #[test]
    fn test_ema_shorter_than_period() {
        let out = ema(&[10.0, 12.0], 20);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_macd_constant_is_zero() {
        let prices = vec![100.0; 60];
        for v in macd(&prices) {
            assert!(v.abs() < 1e-9);
        }
    }

    #[test]
    fn test_rsi_monotonic_up_converges_to_100() {
        let prices: Vec<f64> = (0..100).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&prices, 14);
        assert_eq!(out.len(), prices.len());
        assert!((out[out.len() - 1] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_first_value_neutral() {
        let prices = vec![3.0, 4.0, 3.5, 3.8, 4.2];
        assert!((rsi(&prices, 14)[0] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_empty_and_single() {
        assert!(rsi(&[], 14).is_empty());
        assert_eq!(rsi(&[1.0], 14), vec![0.0]);
    }

    #[test]
    fn test_atr_non_negative() {
        let highs = vec![12.0, 13.5, 12.8, 14.0, 13.2];
        let lows = vec![11.0, 12.0, 12.1, 12.9, 12.5];
        let closes = vec![11.5, 13.0, 12.5, 13.8, 12.9];
        for v in atr(&highs, &lows, &closes, 14) {
            assert!(v >= 0.0);
        }
    }

    #[test]
    fn test_atr_length_matches_input() {
        let highs = vec![2.0; 30];
        let lows = vec![1.0; 30];
        let closes = vec![1.5; 30];
        assert_eq!(atr(&highs, &lows, &closes, 14).len(), 30);
    }
}
