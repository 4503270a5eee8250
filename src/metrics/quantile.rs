//! The P² online quantile estimator (Jain & Chlamtac, 1985): five markers
//! track an approximate quantile without retaining any samples, which is
//! what makes it viable to run on every send/recv in the active recorder.

#[derive(Debug, Clone)]
pub struct P2Quantile {
    p: f64,
    n: [i64; 5],
    np: [f64; 5],
    dn: [f64; 5],
    q: [f64; 5],
    count: u64,
}

impl P2Quantile {
    pub fn new(p: f64) -> Self {
        Self {
            p,
            n: [1, 2, 3, 4, 5],
            np: [1.0, 1.0 + 2.0 * p, 1.0 + 4.0 * p, 3.0 + 2.0 * p, 5.0],
            dn: [0.0, p / 2.0, p, (1.0 + p) / 2.0, 1.0],
            q: [0.0; 5],
            count: 0,
        }
    }

    pub fn observe(&mut self, x: f64) {
        self.count += 1;

        if self.count <= 5 {
            self.q[(self.count - 1) as usize] = x;
            if self.count == 5 {
                self.q.sort_by(|a, b| a.partial_cmp(b).unwrap());
            }
            return;
        }

        let mut k = 0usize;
        if x < self.q[0] {
            self.q[0] = x;
            k = 0;
        } else if x >= self.q[4] {
            self.q[4] = x;
            k = 3;
        } else {
            for i in 0..4 {
                if self.q[i] <= x && x < self.q[i + 1] {
                    k = i;
                    break;
                }
            }
        }

        for i in (k + 1)..5 {
            self.n[i] += 1;
        }
        for i in 0..5 {
            self.np[i] += self.dn[i];
        }

        for i in 1..4 {
            let d = self.np[i] - self.n[i] as f64;
            if (d >= 1.0 && self.n[i + 1] - self.n[i] > 1) || (d <= -1.0 && self.n[i - 1] - self.n[i] < -1) {
                let sign = if d >= 0.0 { 1i64 } else { -1i64 };
                let qn = parabolic(
                    sign as f64,
                    self.n[i - 1] as f64,
                    self.n[i] as f64,
                    self.n[i + 1] as f64,
                    self.q[i - 1],
                    self.q[i],
                    self.q[i + 1],
                );
                let new_q = if self.q[i - 1] < qn && qn < self.q[i + 1] {
                    qn
                } else {
                    linear(sign, self.n[i - 1], self.n[i], self.n[i + 1], self.q[i - 1], self.q[i], self.q[i + 1])
                };
                self.q[i] = new_q;
                self.n[i] += sign;
            }
        }
    }

    /// Current estimate of the configured quantile. Returns 0.0 until at
    /// least one sample has been observed.
    pub fn estimate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else if self.count < 5 {
            let mut sorted = self.q;
            sorted[..self.count as usize].sort_by(|a, b| a.partial_cmp(b).unwrap());
            let idx = ((self.count as f64 - 1.0) * self.p).round() as usize;
            sorted[idx.min(self.count as usize - 1)]
        } else {
            self.q[2]
        }
    }
}

fn parabolic(d: f64, n0: f64, n1: f64, n2: f64, q0: f64, q1: f64, q2: f64) -> f64 {
    q1 + d / (n2 - n0) * ((n1 - n0 + d) * (q2 - q1) / (n2 - n1) + (n2 - n1 - d) * (q1 - q0) / (n1 - n0))
}

fn linear(d: i64, n0: i64, n1: i64, n2: i64, q0: f64, q1: f64, q2: f64) -> f64 {
    if d > 0 {
        q1 + (q2 - q1) / (n2 - n1) as f64
    } else {
        q1 + (q0 - q1) / (n0 - n1) as f64
    }
}
