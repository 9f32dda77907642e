//! Letter grades from percentages.
//!
//! Thresholds are inclusive lower bounds checked from the top; the first
//! match wins. The function is total: values above 100 land in the top
//! bracket, negative values and NaN fall through to `F`.

/// Inclusive lower bound → grade, highest first.
pub const GRADE_THRESHOLDS: [(f64, &str); 7] = [
    (95.0, "A+"),
    (85.0, "A"),
    (75.0, "B+"),
    (65.0, "B"),
    (55.0, "C+"),
    (45.0, "C"),
    (35.0, "D"),
];

/// Grade given when no threshold matches.
pub const FAILING_GRADE: &str = "F";

/// Map a percentage to its letter grade.
pub fn grade_for(percentage: f64) -> &'static str {
    GRADE_THRESHOLDS
        .iter()
        .find(|(min, _)| percentage >= *min)
        .map(|(_, grade)| *grade)
        .unwrap_or(FAILING_GRADE)
}

/// `marks / max_marks × 100`.
///
/// Callers guarantee `max_marks > 0`; the extractor rejects anything else.
pub fn percentage_of(marks: f64, max_marks: f64) -> f64 {
    marks / max_marks * 100.0
}

/// Position of a grade in the table, 0 = best. Unknown grades rank last.
pub fn grade_rank(grade: &str) -> usize {
    GRADE_THRESHOLDS
        .iter()
        .position(|(_, g)| *g == grade)
        .unwrap_or(GRADE_THRESHOLDS.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_boundaries() {
        let cases = [
            (95.0, "A+"),
            (85.0, "A"),
            (75.0, "B+"),
            (65.0, "B"),
            (55.0, "C+"),
            (45.0, "C"),
            (35.0, "D"),
        ];
        for (p, expected) in cases {
            assert_eq!(grade_for(p), expected, "grade_for({p})");
        }
    }

    #[test]
    fn just_below_each_boundary() {
        let cases = [
            (94.999, "A"),
            (84.999, "B+"),
            (74.999, "B"),
            (64.999, "C+"),
            (54.999, "C"),
            (44.999, "D"),
            (34.999, "F"),
        ];
        for (p, expected) in cases {
            assert_eq!(grade_for(p), expected, "grade_for({p})");
        }
    }

    #[test]
    fn out_of_range_values() {
        assert_eq!(grade_for(100.0), "A+");
        assert_eq!(grade_for(140.0), "A+");
        assert_eq!(grade_for(0.0), "F");
        assert_eq!(grade_for(-12.0), "F");
        assert_eq!(grade_for(f64::NAN), "F");
    }

    #[test]
    fn monotonic_as_percentage_decreases() {
        let mut last_rank = 0;
        let mut p = 110.0;
        while p >= -10.0 {
            let rank = grade_rank(grade_for(p));
            assert!(rank >= last_rank, "rank went up at {p}");
            last_rank = rank;
            p -= 0.25;
        }
        assert_eq!(last_rank, GRADE_THRESHOLDS.len());
    }

    #[test]
    fn percentage_of_subject() {
        assert_eq!(percentage_of(45.0, 50.0), 90.0);
        assert_eq!(grade_for(percentage_of(45.0, 50.0)), "A");
    }
}
