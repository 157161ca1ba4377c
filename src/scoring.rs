//! Grading a submission against a quiz. Pure computation.

use crate::domain::{GradeResult, QuestionOutcome, Quiz, SubmittedAnswers};

/// Unanswered questions count as incorrect. Answers for indices outside the quiz are ignored.
pub fn grade(quiz: &Quiz, answers: &SubmittedAnswers) -> GradeResult {
  let per_question: Vec<QuestionOutcome> = quiz
    .questions()
    .iter()
    .enumerate()
    .map(|(i, q)| QuestionOutcome { is_correct: answers.get(&i) == Some(&q.correct_index()) })
    .collect();

  let correct_count = per_question.iter().filter(|o| o.is_correct).count();
  GradeResult {
    correct_count: u32::try_from(correct_count).unwrap_or(u32::MAX),
    total: u32::try_from(quiz.len()).unwrap_or(u32::MAX),
    per_question,
  }
}
