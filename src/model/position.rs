/// A location in widget space: a character cell on the visible text surface.
/// `y` is a display line index (folding-collapsed), `x` a column within it.
/// A cell past the end of its line, or past the last line, is *virtual* — it
/// maps to no real document offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CellPoint {
    pub y: usize,
    pub x: usize,
}

impl CellPoint {
    pub fn new(y: usize, x: usize) -> Self {
        Self { y, x }
    }
}

/// A normalized rectangle in cell space. `width` counts columns between the
/// two horizontal bounds (zero for a degenerate block), `height` counts rows
/// with both corner rows included (always at least one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl CellRect {
    /// Rectangle spanned by two corner cells, in any order.
    pub fn spanning(a: CellPoint, b: CellPoint) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        Self {
            x,
            y,
            width: a.x.max(b.x) - x,
            height: a.y.max(b.y) - y + 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0
    }
}

/// Mapping between display (widget) lines and document-model lines under
/// folding. Folded regions hide whole model lines; display space counts only
/// the visible ones. With no folds the mapping is the identity.
///
/// All persisted positions use model space, because display positions are
/// invalidated whenever a fold opens or closes.
#[derive(Debug, Clone, Default)]
pub struct FoldMap {
    /// Hidden model line ranges, sorted, disjoint, non-adjacent.
    folded: Vec<(usize, usize)>,
}

impl FoldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_identity(&self) -> bool {
        self.folded.is_empty()
    }

    /// Hide the model lines `start..=end`. Ranges must not overlap an
    /// existing fold.
    pub fn fold(&mut self, start: usize, end: usize) {
        debug_assert!(start <= end);
        debug_assert!(
            !self
                .folded
                .iter()
                .any(|&(s, e)| start <= e && s <= end),
            "overlapping fold"
        );
        self.folded.push((start, end));
        self.folded.sort_unstable();
    }

    pub fn clear(&mut self) {
        self.folded.clear();
    }

    pub fn is_hidden(&self, model_line: usize) -> bool {
        self.folded
            .iter()
            .any(|&(s, e)| s <= model_line && model_line <= e)
    }

    /// Display line for a model line, or `None` if the line is folded away.
    pub fn display_line(&self, model_line: usize) -> Option<usize> {
        let mut hidden_before = 0;
        for &(s, e) in &self.folded {
            if model_line < s {
                break;
            }
            if model_line <= e {
                return None;
            }
            hidden_before += e - s + 1;
        }
        Some(model_line - hidden_before)
    }

    /// Model line for a display line. Saturates at the line following the
    /// last fold when the display index runs past everything visible.
    pub fn model_line(&self, display_line: usize) -> usize {
        let mut model = display_line;
        for &(s, e) in &self.folded {
            if model < s {
                break;
            }
            model += e - s + 1;
        }
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_when_empty() {
        let map = FoldMap::new();
        assert!(map.is_identity());
        assert_eq!(map.display_line(7), Some(7));
        assert_eq!(map.model_line(7), 7);
    }

    #[test]
    fn display_skips_folded_lines() {
        let mut map = FoldMap::new();
        map.fold(2, 4);

        assert_eq!(map.display_line(0), Some(0));
        assert_eq!(map.display_line(1), Some(1));
        assert_eq!(map.display_line(2), None);
        assert_eq!(map.display_line(4), None);
        assert_eq!(map.display_line(5), Some(2));
        assert_eq!(map.display_line(10), Some(7));
    }

    #[test]
    fn model_line_round_trip() {
        let mut map = FoldMap::new();
        map.fold(1, 1);
        map.fold(5, 7);

        for model in [0usize, 2, 3, 4, 8, 9, 20] {
            let display = map.display_line(model).unwrap();
            assert_eq!(map.model_line(display), model);
        }
    }

    #[test]
    fn rect_spans_any_corner_order() {
        let a = CellPoint::new(4, 10);
        let b = CellPoint::new(1, 2);
        let rect = CellRect::spanning(a, b);
        assert_eq!(
            rect,
            CellRect {
                x: 2,
                y: 1,
                width: 8,
                height: 4
            }
        );
        assert_eq!(rect, CellRect::spanning(b, a));
        assert!(!rect.is_empty());
        assert!(CellRect::spanning(a, a).is_empty());
    }
}
