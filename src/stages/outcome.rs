//! 对话结果分析阶段
//!
//! 客观评估对话流向：根据用户对智能体上一条回复的反应分类结果与情绪。
//! 输出仅用于内部分析，不返回给用户。

use crate::stages::StageAgent;
use crate::tools::json_schema_of;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 本阶段的输出键
pub const OUTPUT_KEY: &str = "conversationAnalysisOutput";

/// 对话结果分类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConversationOutcome {
    #[serde(rename = "OUTCOMEIRRELEVANT")]
    Irrelevant,
    #[serde(rename = "OUTCOMEACKNOWLEDGED")]
    Acknowledged,
    #[serde(rename = "OUTCOMEREJECTED")]
    Rejected,
    #[serde(rename = "OUTCOMEENGAGED")]
    Engaged,
    #[serde(rename = "OUTCOMETOPICCHANGE")]
    TopicChange,
    #[serde(rename = "OUTCOMEAMBIGUOUS")]
    Ambiguous,
}

/// 用户情绪分类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum UserSentiment {
    #[serde(rename = "SENTIMENTPOSITIVE")]
    Positive,
    #[serde(rename = "SENTIMENTNEGATIVE")]
    Negative,
    #[serde(rename = "SENTIMENTNEUTRAL")]
    Neutral,
}

/// 对话结果分析输出
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ConversationAnalysisOutput {
    /// 对话结果分类
    pub outcome: ConversationOutcome,
    /// 用户情绪分类
    pub sentiment: UserSentiment,
    /// 分类理由
    pub reasoning: String,
}

const INSTRUCTIONS: &str = r#"
You are an AI assistant designed to analyze conversations between users and a movie expert agent.
Your task is to objectively assess the flow of the conversation and determine the outcome of the agent's response based solely on the user's reaction to it.
You also need to determine the user's sentiment based on their last message.
You only get a truncated version of the conversation history.

Here's how to analyze the conversation:

1. Read the conversation history carefully, paying attention to the sequence of messages and the topics discussed.
2. Focus on the agent's response and how the user reacts to it.

Guidelines for classification of the conversation outcome:

*   OUTCOMEIRRELEVANT: The agent's response is not connected to the user's previous turn or doesn't address the user's query or request.
*   OUTCOMEACKNOWLEDGED: The user acknowledges the agent's response with neutral remarks like "Okay," "Got it," or a simple "Thanks" without indicating further interest or engagement.
*   OUTCOMEREJECTED: The user responds negatively to the agent's response like "No," "I don't like it," or a simple "No thanks" without indicating further interest or engagement.
*   OUTCOMEENGAGED: The user shows interest in the agent's response and wants to delve deeper into the topic. This could be through follow-up questions, requests for more details, or expressing a desire to learn more about the movie or topic mentioned by the agent.
*   OUTCOMETOPICCHANGE: The user shifts the conversation to a new topic unrelated to the agent's response.
*   OUTCOMEAMBIGUOUS: The user's response is too vague or open-ended to determine the outcome with certainty.

Examples:

User: "I'm looking for a movie with strong female characters."
Agent: "Have you seen 'Alien'?"
User: "Tell me more about it."
Outcome: OUTCOMEENGAGED (The user shows interest in the agent's suggestion and wants to learn more.)

Agent: "Let me tell you about the movie 'Alien'?"
User: "I hate that film"
Outcome: OUTCOMEREJECTED (The user rejects the agent's suggestion.)

Agent: "Have you seen 'Alien'?"
User: "No. Tell me about 'Princess diaries'"
Outcome: OUTCOMETOPICCHANGE (The user shows no interest in the agent's suggestion and changes the topic.)

Agent: "Have you seen 'Alien'?"
User: "I told you I am not interested in sci-fi."
Outcome: OUTCOMEIRRELEVANT (The agent made a wrong suggestion.)

Guidelines for classification of the user sentiment:
* SENTIMENTPOSITIVE: If the user expresses excitement, joy etc. Simply rejecting an agent's suggestion is not negative.
* SENTIMENTNEGATIVE: If the user expresses frustration, irritation, anger etc. Simply rejecting an agent's suggestion is not negative.
* SENTIMENTNEUTRAL: If the user expresses no specific emotion

Remember:

*   Do not make assumptions about the user's satisfaction or perception of helpfulness.
*   Do not return this response to the user. This is meant for internal analysis only. The user need not know about the outcome.
*   Focus only on the objective flow of the conversation and how the user's response relates to the agent's previous turn.
*   If the outcome is unclear based on the user's response, use OUTCOMEAMBIGUOUS.
"#;

/// 构造对话结果分析阶段（无工具）
pub fn conversation_analysis_stage() -> StageAgent {
    StageAgent::new(
        "conversation_analysis",
        OUTPUT_KEY,
        INSTRUCTIONS,
        json_schema_of::<ConversationAnalysisOutput>(),
        Box::new(|value| {
            serde_json::from_value::<ConversationAnalysisOutput>(value.clone())
                .map(|_| ())
                .map_err(|e| e.to_string())
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_roundtrip() {
        let value = json!({
            "outcome": "OUTCOMEENGAGED",
            "sentiment": "SENTIMENTPOSITIVE",
            "reasoning": "User asked a follow-up question"
        });
        let output: ConversationAnalysisOutput = serde_json::from_value(value).unwrap();
        assert_eq!(output.outcome, ConversationOutcome::Engaged);
        assert_eq!(output.sentiment, UserSentiment::Positive);
    }

    #[test]
    fn test_unknown_outcome_rejected() {
        let value = json!({
            "outcome": "OUTCOMEWHATEVER",
            "sentiment": "SENTIMENTNEUTRAL",
            "reasoning": "..."
        });
        assert!(serde_json::from_value::<ConversationAnalysisOutput>(value).is_err());
    }

    #[test]
    fn test_stage_shape() {
        let stage = conversation_analysis_stage();
        assert_eq!(stage.output_key(), OUTPUT_KEY);
    }
}
