//! C3: fixed-point conversion and the overflow-guarded position updates
//! shared by every opcode that moves `h`/`v`. Kept free of any opcode
//! dispatch so it can be unit tested against the rounding invariants in
//! spec §8 directly.

use crate::diagnostics::DiagnosticSink;

/// `2^31 - 1`, the largest representable DVI coordinate.
pub const INFINITY: i32 = i32::MAX;

/// The eight registers threaded through every opcode: six DVI-unit position
/// registers plus their pixel companions. Pushed and popped as a unit by
/// `push`/`pop`; `curFont` is deliberately not part of this struct (spec
/// §3: "NOT pushed/popped").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Registers {
    pub h: i32,
    pub v: i32,
    pub w: i32,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub hh: i32,
    pub vv: i32,
}

/// The smallest integer `n` with `n >= conv * x`, i.e. the ceiling of the
/// real product. Spec §4.3, verified by the invariant in §8.6:
/// `rule_pixels(x) - conv*x` is in `[0, 1)` for `x > 0`.
pub fn rule_pixels(conv: f64, x: i32) -> i32 {
    let product = conv * f64::from(x);
    let truncated = product.trunc();
    let n = if truncated < product {
        truncated + 1.0
    } else {
        truncated
    };
    n as i32
}

/// Clamp `q` against the overflow guard in §4.3 `move_right` step 1. Returns
/// the (possibly clamped) delta; emits a diagnostic when clamping occurred.
fn clamp_overflow(h: i32, q: i32, sink: &mut dyn DiagnosticSink) -> i32 {
    if h > 0 && q > 0 && h > INFINITY - q {
        sink.report(&format!(
            "arithmetic_overflow: h={h} + q={q} would exceed {INFINITY}; clamping"
        ));
        INFINITY - h
    } else if h < 0 && q < 0 && h < -INFINITY - q {
        sink.report(&format!(
            "arithmetic_overflow: h={h} + q={q} would exceed -{INFINITY}; clamping"
        ));
        -INFINITY - h
    } else {
        q
    }
}

impl Registers {
    /// `move_right`: update `h`/`hh` by `q` DVI units, per §4.3. `max_h_claim`
    /// is the postamble's `maxH`; `max_h_so_far` is updated in place and a
    /// diagnostic is emitted if the claim is exceeded (non-fatal, §7).
    pub fn move_right(
        &mut self,
        q: i32,
        conv: f64,
        max_h_claim: i32,
        max_h_so_far: &mut i32,
        sink: &mut dyn DiagnosticSink,
    ) {
        let q = clamp_overflow(self.h, q, sink);
        self.hh = (conv * f64::from(self.h + q)).round() as i32;
        self.h += q;
        if self.h.unsigned_abs() > max_h_so_far.unsigned_abs() {
            *max_h_so_far = self.h;
        }
        if self.h.unsigned_abs() > max_h_claim.unsigned_abs() + 99 {
            sink.report(&format!(
                "maxH_or_maxV_exceeded: |h|={} exceeds claimed maxH {} + 99",
                self.h, max_h_claim
            ));
        }
    }

    /// `move_down`: update `v`/`vv` by `p` DVI units, per §4.3. Large motions
    /// (>= 5 * font_space) resynchronize `vv` exactly; small motions
    /// accumulate the rounded delta to avoid visible jitter from repeated
    /// rounding error.
    pub fn move_down(
        &mut self,
        p: i32,
        conv: f64,
        font_space: i32,
        max_v_claim: i32,
        max_v_so_far: &mut i32,
        sink: &mut dyn DiagnosticSink,
    ) {
        let p = clamp_overflow(self.v, p, sink);
        if i64::from(p).unsigned_abs() >= 5 * i64::from(font_space).unsigned_abs() {
            self.vv = (conv * f64::from(self.v + p)).round() as i32;
        } else {
            self.vv += (conv * f64::from(p)).round() as i32;
        }
        self.v += p;
        if self.v.unsigned_abs() > max_v_so_far.unsigned_abs() {
            *max_v_so_far = self.v;
        }
        if self.v.unsigned_abs() > max_v_claim.unsigned_abs() + 99 {
            sink.report(&format!(
                "maxH_or_maxV_exceeded: |v|={} exceeds claimed maxV {} + 99",
                self.v, max_v_claim
            ));
        }
    }

    /// `out_space`: the horizontal analogue of `move_down`'s resync
    /// threshold, used by `right*`/`w*`/`x*`. The resync threshold is
    /// asymmetric (`p >= fontSpace` but `p <= -4*fontSpace`) to accommodate
    /// large leftward accent backspaces without resyncing on small rightward
    /// kerns. `move_right` is then called to update `h` itself.
    pub fn out_space(
        &mut self,
        p: i32,
        conv: f64,
        font_space: i32,
        max_h_claim: i32,
        max_h_so_far: &mut i32,
        sink: &mut dyn DiagnosticSink,
    ) {
        if p >= font_space || p <= -4 * font_space {
            self.hh = (conv * f64::from(self.h + p)).round() as i32;
        } else {
            self.hh += (conv * f64::from(p)).round() as i32;
        }
        // move_right recomputes hh too, but only from `h + q`, which is
        // exactly what we already set it to above when q == p; calling it
        // here keeps the overflow guard and maxHSoFar bookkeeping in one
        // place without duplicating that logic.
        let saved_hh = self.hh;
        self.move_right(p, conv, max_h_claim, max_h_so_far, sink);
        self.hh = saved_hh;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::diagnostics::VecDiagnosticSink;

    #[test]
    fn rule_pixels_is_a_ceiling() {
        // conv chosen so 1 DVI unit -> 0.5 px; ceil(500 * 0.5) = 250
        assert_eq!(rule_pixels(0.5, 500), 250);
        assert_eq!(rule_pixels(0.5, 501), 251);
    }

    #[test]
    fn rule_pixels_invariant_holds() {
        let conv = 1.0 / 65536.0 * 1.5;
        for x in [1, 7, 100, 65536, 123457] {
            let n = rule_pixels(conv, x);
            let residual = f64::from(n) - conv * f64::from(x);
            assert!((0.0..1.0).contains(&residual), "residual {residual} for x={x}");
        }
    }

    #[test]
    fn move_right_updates_hh_and_h() {
        let mut regs = Registers::default();
        let mut sink = VecDiagnosticSink::default();
        let mut max_h_so_far = 0;
        regs.move_right(1000, 0.5, 0, &mut max_h_so_far, &mut sink);
        assert_eq!(regs.h, 1000);
        assert_eq!(regs.hh, 500);
    }

    #[test]
    fn move_right_clamps_on_overflow() {
        let mut regs = Registers {
            h: INFINITY - 10,
            ..Default::default()
        };
        let mut sink = VecDiagnosticSink::default();
        let mut max_h_so_far = 0;
        regs.move_right(1000, 1.0, 0, &mut max_h_so_far, &mut sink);
        assert_eq!(regs.h, INFINITY);
        assert!(sink.lines.iter().any(|l| l.contains("arithmetic_overflow")));
    }

    #[test]
    fn move_down_resyncs_on_large_motion() {
        let mut regs = Registers {
            v: 100,
            vv: 999, // deliberately out of sync to prove resync happens
            ..Default::default()
        };
        let mut sink = VecDiagnosticSink::default();
        let mut max_v_so_far = 0;
        regs.move_down(1000, 0.5, 10, 0, &mut max_v_so_far, &mut sink);
        assert_eq!(regs.v, 1100);
        assert_eq!(regs.vv, 550); // resynced to conv * v, not vv + conv*p
    }

    #[test]
    fn move_down_accumulates_on_small_motion() {
        let mut regs = Registers {
            v: 100,
            vv: 999,
            ..Default::default()
        };
        let mut sink = VecDiagnosticSink::default();
        let mut max_v_so_far = 0;
        regs.move_down(1, 0.5, 1000, 0, &mut max_v_so_far, &mut sink);
        assert_eq!(regs.v, 101);
        assert_eq!(regs.vv, 1000); // accumulated: 999 + round(0.5*1) == 999 + 1
    }

    #[test]
    fn out_space_resyncs_past_threshold() {
        let mut regs = Registers {
            h: 0,
            hh: 12345,
            ..Default::default()
        };
        let mut sink = VecDiagnosticSink::default();
        let mut max_h_so_far = 0;
        regs.out_space(20, 1.0, 10, 0, &mut max_h_so_far, &mut sink);
        assert_eq!(regs.h, 20);
        assert_eq!(regs.hh, 20);
    }
}
