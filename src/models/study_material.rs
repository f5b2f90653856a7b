/// One uploaded document reduced to plain text. Lives only for the duration
/// of a generation request.
#[derive(Debug, Clone)]
pub struct StudyMaterial {
    pub filename: String,
    pub text: String,
}
