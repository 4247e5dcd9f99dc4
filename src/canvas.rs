//! Canvas state rebuilt from commands. Rendering is someone else's job; this only tracks
//! which segments are currently visible.

use crate::model::{CanvasOp, DrawingCommand, Stroke};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Canvas {
    strokes: Vec<Stroke>,
}

impl Canvas {
    pub fn new() -> Self { Self::default() }

    pub fn apply(&mut self, op: &CanvasOp) {
        match op {
            CanvasOp::Stroke(s) => self.strokes.push(s.clone()),
            CanvasOp::Clear => self.strokes.clear(),
        }
    }

    pub fn apply_command(&mut self, cmd: &DrawingCommand) {
        self.apply(&cmd.op());
    }

    /// Replaces whatever is on the canvas with the given history.
    pub fn replay(&mut self, history: &[DrawingCommand]) {
        self.strokes.clear();
        history.iter().for_each(|cmd| self.apply_command(cmd));
    }

    pub fn strokes(&self) -> &[Stroke] { &self.strokes }

    pub fn is_blank(&self) -> bool { self.strokes.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stroke(n: f64) -> Stroke { Stroke::new(n, n, n + 1.0, n + 1.0, "black", 2.0) }

    #[test]
    fn clear_resets_prior_strokes() {
        let ts = Utc::now();
        let history = vec![
            CanvasOp::Stroke(stroke(1.0)).stamp(ts),
            CanvasOp::Stroke(stroke(2.0)).stamp(ts),
            CanvasOp::Clear.stamp(ts),
            CanvasOp::Stroke(stroke(3.0)).stamp(ts),
        ];

        let mut canvas = Canvas::new();
        canvas.replay(&history);
        assert_eq!(canvas.strokes(), &[stroke(3.0)]);
    }

    #[test]
    fn replay_discards_live_state() {
        let mut canvas = Canvas::new();
        canvas.apply(&CanvasOp::Stroke(stroke(9.0)));
        canvas.replay(&[]);
        assert!(canvas.is_blank());
    }
}
