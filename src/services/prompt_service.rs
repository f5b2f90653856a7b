use crate::models::study_material::StudyMaterial;

pub const FILE_SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Compose the directive sent to the generation service.
///
/// The student's instruction is embedded verbatim so counts and format
/// requests ("100 questions", "NCLEX style") reach the model untouched. The
/// closing JSON shape is a contract with the response parser in
/// `generation_service`: the field names must stay `test` and `solutions`.
pub fn compose_directive(materials: &[StudyMaterial], instructions: &str) -> String {
    let combined = materials
        .iter()
        .map(|m| format!("File: {}\n\n{}", m.filename, m.text))
        .collect::<Vec<_>>()
        .join(FILE_SECTION_SEPARATOR);

    format!(
        r#"You are an experienced nursing instructor who writes practice tests for nursing students.

STUDY MATERIALS:
{combined}

STUDENT REQUEST: {instructions}

Follow the student's request exactly as written, including any requested number of questions, question formats, or topics to emphasize.

Produce two documents:

1. TEST DOCUMENT: a complete practice test drawn from the study materials. Mix question types (multiple choice, select-all-that-apply, short answer) and cover every major topic that appears in the materials.

2. SOLUTION SHEET: the correct answer to every question, each with a brief explanation of why it is correct.

Respond with a single JSON object containing exactly two string fields:
{{"test": "<the full test document>", "solutions": "<the full solution sheet>"}}"#
    )
}
