//! Open knot vectors.
use crate::error::Error;
use itertools::Itertools;

/// A non-decreasing sequence of knots with end multiplicity `degree + 1`.
///
/// The only way to mutate a knot vector after construction is [`KnotVector::insert`], which
/// preserves ordering and the open end conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct KnotVector {
    knots: Vec<f64>,
    degree: usize,
}

impl KnotVector {
    /// Creates a knot vector from an explicit knot sequence.
    ///
    /// The sequence must be non-decreasing, open (the first and last knots repeated exactly
    /// `degree + 1` times) and must not repeat any interior knot more than `degree + 1` times.
    pub fn new(knots: Vec<f64>, degree: usize) -> Result<Self, Error> {
        let p = degree;
        if knots.len() < 2 * (p + 1) {
            return Err(Error::invalid_parameter(format!(
                "knot vector of degree {p} needs at least {} knots, got {}",
                2 * (p + 1),
                knots.len()
            )));
        }
        if knots.iter().any(|t| !t.is_finite()) {
            return Err(Error::invalid_parameter("knots must be finite"));
        }
        if knots.iter().tuple_windows().any(|(a, b)| a > b) {
            return Err(Error::invalid_parameter("knots must be non-decreasing"));
        }

        let n = knots.len();
        let (first, last) = (knots[0], knots[n - 1]);
        if first >= last {
            return Err(Error::invalid_parameter("knot vector spans an empty domain"));
        }
        let open_start = knots[p] == first && knots[p + 1] > first;
        let open_end = knots[n - 1 - p] == last && knots[n - 2 - p] < last;
        if !(open_start && open_end) {
            return Err(Error::invalid_parameter(format!(
                "end knots must have multiplicity exactly {}",
                p + 1
            )));
        }

        let result = Self { knots, degree };
        if let Some((t, m)) = result
            .interior_multiplicities()
            .into_iter()
            .find(|&(_, m)| m > p + 1)
        {
            return Err(Error::invalid_parameter(format!(
                "interior knot {t} has multiplicity {m}, exceeding degree + 1 = {}",
                p + 1
            )));
        }
        Ok(result)
    }

    /// An open knot vector on `[first, last]` with `num_interior` evenly spaced interior knots.
    ///
    /// The end knots are repeated `mult_ends` times, which fixes the degree to
    /// `mult_ends - 1`, and each interior knot is repeated `mult_interior` times.
    pub fn uniform(
        first: f64,
        last: f64,
        num_interior: usize,
        mult_ends: usize,
        mult_interior: usize,
    ) -> Result<Self, Error> {
        if mult_ends == 0 {
            return Err(Error::invalid_parameter("end multiplicity must be positive"));
        }
        let mut knots = Vec::with_capacity(2 * mult_ends + num_interior * mult_interior);
        knots.extend(std::iter::repeat(first).take(mult_ends));
        let h = (last - first) / (num_interior + 1) as f64;
        for k in 1..=num_interior {
            let t = first + k as f64 * h;
            knots.extend(std::iter::repeat(t).take(mult_interior));
        }
        knots.extend(std::iter::repeat(last).take(mult_ends));
        Self::new(knots, mult_ends - 1)
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn len(&self) -> usize {
        self.knots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.knots.is_empty()
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn knot(&self, index: usize) -> f64 {
        self.knots[index]
    }

    pub fn first(&self) -> f64 {
        self.knots[0]
    }

    pub fn last(&self) -> f64 {
        self.knots[self.knots.len() - 1]
    }

    /// The parametric domain `[first, last]`.
    pub fn domain(&self) -> [f64; 2] {
        [self.first(), self.last()]
    }

    /// The number of knots equal to `t`.
    pub fn multiplicity(&self, t: f64) -> usize {
        self.knots.iter().filter(|&&k| k == t).count()
    }

    /// The distinct knot values in increasing order.
    pub fn breaks(&self) -> Vec<f64> {
        self.knots.iter().copied().dedup().collect()
    }

    /// Distinct interior knots together with their multiplicities.
    pub fn interior_multiplicities(&self) -> Vec<(f64, usize)> {
        let (first, last) = (self.first(), self.last());
        self.knots
            .iter()
            .copied()
            .dedup_with_count()
            .filter(|&(_, t)| t != first && t != last)
            .map(|(m, t)| (t, m))
            .collect()
    }

    /// The number of non-empty knot spans.
    pub fn num_elements(&self) -> usize {
        self.breaks().len() - 1
    }

    /// Inserts `t` with the given multiplicity, keeping the sequence sorted.
    ///
    /// The knot must lie strictly inside the domain, and the resulting multiplicity may not
    /// exceed `degree + 1`. Inserting with multiplicity zero does nothing.
    pub fn insert(&mut self, t: f64, multiplicity: usize) -> Result<(), Error> {
        if multiplicity == 0 {
            return Ok(());
        }
        if !(t > self.first() && t < self.last()) {
            return Err(Error::invalid_parameter(format!(
                "knot {t} lies outside the open domain ({}, {})",
                self.first(),
                self.last()
            )));
        }
        let resulting = self.multiplicity(t) + multiplicity;
        if resulting > self.degree + 1 {
            return Err(Error::invalid_parameter(format!(
                "inserting knot {t} would give multiplicity {resulting} > {}",
                self.degree + 1
            )));
        }
        let position = self.knots.partition_point(|&k| k <= t);
        self.knots
            .splice(position..position, std::iter::repeat(t).take(multiplicity));
        Ok(())
    }

    /// The index `s` of the knot span `[t_s, t_{s+1})` containing `x`.
    ///
    /// Values outside the domain are clamped, so that the last span is closed on the right.
    pub fn find_span(&self, x: f64) -> usize {
        let p = self.degree;
        let n = self.knots.len() - p - 1;
        if x >= self.knots[n] {
            return n - 1;
        }
        if x <= self.knots[p] {
            return p;
        }
        // First index with knot > x, minus one
        self.knots.partition_point(|&k| k <= x) - 1
    }
}
