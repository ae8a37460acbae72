//! Stable Matching
//!
//! Gale–Shapley over a dense filler × slot score table. Fillers propose;
//! both sides rank the other by descending score. Ties go to the earlier
//! slot (filler side) and the earlier filler (slot side).
//!
//! Non-finite scores mark infeasible pairs. They stay in the table but never
//! enter a preference list, so a filler that runs out of finite options is
//! reported as unmatched.

use std::collections::VecDeque;

/// Dense score table, row-major by filler
#[derive(Debug, Clone)]
pub struct ScoreTable {
    fillers: usize,
    slots: usize,
    scores: Vec<f32>,
}

impl ScoreTable {
    /// Table with every pair infeasible
    pub fn new(fillers: usize, slots: usize) -> Self {
        Self {
            fillers,
            slots,
            scores: vec![f32::NEG_INFINITY; fillers * slots],
        }
    }

    /// Fill every cell from `score(filler, slot)`
    pub fn from_fn(fillers: usize, slots: usize, mut score: impl FnMut(usize, usize) -> f32) -> Self {
        let mut table = Self::new(fillers, slots);
        for f in 0..fillers {
            for s in 0..slots {
                table.set(f, s, score(f, s));
            }
        }
        table
    }

    /// Set a score; NaN counts as infeasible
    pub fn set(&mut self, filler: usize, slot: usize, score: f32) {
        self.scores[filler * self.slots + slot] = if score.is_nan() {
            f32::NEG_INFINITY
        } else {
            score
        };
    }

    #[inline]
    pub fn get(&self, filler: usize, slot: usize) -> f32 {
        self.scores[filler * self.slots + slot]
    }

    #[inline]
    pub fn is_feasible(&self, filler: usize, slot: usize) -> bool {
        self.get(filler, slot).is_finite()
    }

    pub fn fillers(&self) -> usize {
        self.fillers
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Feasible slots for a filler, best first
    fn preferences(&self, filler: usize) -> Vec<usize> {
        let mut prefs: Vec<usize> = (0..self.slots)
            .filter(|&s| self.is_feasible(filler, s))
            .collect();
        prefs.sort_by(|&a, &b| {
            self.get(filler, b)
                .total_cmp(&self.get(filler, a))
                .then(a.cmp(&b))
        });
        prefs
    }

    /// Whether `slot` ranks `candidate` above `holder`
    fn slot_prefers(&self, slot: usize, candidate: usize, holder: usize) -> bool {
        let (c, h) = (self.get(candidate, slot), self.get(holder, slot));
        c > h || (c == h && candidate < holder)
    }
}

/// Outcome of a matching run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// `slot_of[f]` is the slot index matched to filler `f`
    Complete(Vec<usize>),
    /// Filler that exhausted its feasible slots
    Unmatched(usize),
}

/// Filler-proposing Gale–Shapley
pub fn stable_match(table: &ScoreTable) -> MatchOutcome {
    let prefs: Vec<Vec<usize>> = (0..table.fillers).map(|f| table.preferences(f)).collect();
    let mut next = vec![0usize; table.fillers];
    let mut holder: Vec<Option<usize>> = vec![None; table.slots];
    let mut free: VecDeque<usize> = (0..table.fillers).collect();

    while let Some(f) = free.pop_front() {
        let Some(&s) = prefs[f].get(next[f]) else {
            return MatchOutcome::Unmatched(f);
        };
        next[f] += 1;
        match holder[s] {
            None => holder[s] = Some(f),
            Some(current) if table.slot_prefers(s, f, current) => {
                holder[s] = Some(f);
                free.push_back(current);
            }
            Some(_) => free.push_back(f),
        }
    }

    let mut slot_of = vec![usize::MAX; table.fillers];
    for (s, h) in holder.iter().enumerate() {
        if let Some(f) = h {
            slot_of[*f] = s;
        }
    }
    MatchOutcome::Complete(slot_of)
}
