pub mod study_material;
pub mod test_answer;
pub mod test_attempt;
