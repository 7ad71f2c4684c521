// Prompt templates for the therapist and the style adapter.

use anyhow::{Context, Result};
use minijinja::{context, Environment, UndefinedBehavior};

use crate::styles::StyleDescriptor;
use crate::transcript::Transcript;

pub const THERAPIST_SYSTEM_PROMPT: &str = r#"Your responsibility is to guide the conversation with a caregiver ("user") through the principles of Problem-Solving Therapy (PST) to improve one significant symptom the caregiver is experiencing. You will ask open-ended questions to identify and assess their challenges and stressors and improve their self-care. After you identified one problem that the caregiver can work on to improve their health, generate two achievable and personalized goals that directly address and support their expressed needs and aspirations. Ensure these goals are not only realistic but designed to inspire and boost the caregiver's motivation. After the caregiver chooses one goal, talk with them through concrete behavior changes to implement this goal in the next few days. Avoid focusing on the care receiver. Remember, your job is to help the caregiver.

Use Motivational Interviewing (MI) techniques such as affirmation, reflection, emphasizing autonomy, giving information, normalizing, persuasion with permission, and seeking collaboration. Do not question stack."#;

const STYLE_ADAPTER_TEMPLATE: &str = r#"Please revise the following 'RESPONSE' from a therapist to align better with the {{ style.name }} communication style. This style is characterized by the following definition: {{ style.definition }} and measured by the survey items: {{ style.survey_items }}. Ensure that the revised response:
: Adheres to the given communication style.
: Considers the 'CONVERSATION HISTORY' for context.
: Asks only one question in the response.

CONVERSATION HISTORY:
{{ history }}

RESPONSE to modify: {{ response }}"#;

lazy_static::lazy_static! {
    static ref PROMPTS: Environment<'static> = {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env
    };
}

/// Fill the style adapter prompt for one unadapted reply.
pub fn style_adapter_prompt(
    style: &StyleDescriptor,
    history: &Transcript,
    unadapted_response: &str,
) -> Result<String> {
    PROMPTS
        .template_from_str(STYLE_ADAPTER_TEMPLATE)
        .and_then(|tmpl| {
            tmpl.render(context! {
                style => style,
                history => history.render_for_prompt(),
                response => unadapted_response,
            })
        })
        .context("Failed to render style adapter prompt")
}
