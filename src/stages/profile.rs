//! 用户画像阶段
//!
//! 从用户消息中抽取长期稳定的电影喜好与厌恶（仅限强烈表达），
//! 产出画像变更建议供偏好存储更新。输出仅用于内部画像，不返回给用户。

use crate::stages::StageAgent;
use crate::tools::json_schema_of;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 本阶段的输出键
pub const OUTPUT_KEY: &str = "userProfileOutput";

/// 画像条目类别
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ProfileCategory {
    #[serde(rename = "ACTOR")]
    Actor,
    #[serde(rename = "DIRECTOR")]
    Director,
    #[serde(rename = "GENRE")]
    Genre,
    #[serde(rename = "OTHER")]
    Other,
}

/// 用户对条目的情感倾向
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum PreferenceSentiment {
    #[serde(rename = "POSITIVE")]
    Positive,
    #[serde(rename = "NEGATIVE")]
    Negative,
    #[serde(rename = "NEUTRAL")]
    Neutral,
}

/// 单条画像变更建议
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ProfileChangeRecommendation {
    /// 条目类别（ACTOR / DIRECTOR / GENRE / OTHER）
    pub category: ProfileCategory,
    /// 条目值（如 "Alien"、"romantic comedy"）
    pub item: String,
    /// 抽取理由
    pub reason: String,
    /// 情感倾向
    pub sentiment: PreferenceSentiment,
}

/// 用户画像输出
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct UserProfileOutput {
    /// 抽取方式的说明
    pub justification: String,
    /// 查询是否涉及危险内容
    #[serde(rename = "safetyIssue")]
    pub safety_issue: bool,
    /// 画像变更建议列表
    #[serde(rename = "profileChangeRecommendations")]
    pub profile_change_recommendations: Vec<ProfileChangeRecommendation>,
}

const INSTRUCTIONS: &str = r#"
You are a user's movie profiling expert focused on uncovering users' enduring likes and dislikes.
Your task is to analyze the user message and extract ONLY strongly expressed, enduring likes and dislikes related to movies.
Once you extract any new likes or dislikes from the current query respond with the items you extracted with:
    1. the category (ACTOR, DIRECTOR, GENRE, OTHER)
    2. the item value
    3. your reason behind the choice
    4. the sentiment of the user has about the item (POSITIVE, NEGATIVE, NEUTRAL).

Guidelines:
1. Strong likes and dislikes Only: Add or Remove ONLY items expressed with strong language indicating long-term enjoyment or aversion (e.g., "love," "hate," "can't stand,", "always enjoy"). Ignore mild or neutral items (e.g., "like,", "okay with," "fine", "in the mood for", "do not feel like").
2. Distinguish current state of mind vs. Enduring likes and dislikes: Be very cautious when interpreting statements. Focus only on long-term likes or dislikes while ignoring current state of mind. If the user expresses wanting to watch a specific type of movie or actor NOW, do NOT assume it's an enduring like unless they explicitly state it. For example, "I want to watch a horror movie with Christina Applegate" is a current desire, NOT an enduring preference for horror movies or Christina Applegate.
3. Focus on Specifics: Look for concrete details about genres, directors, actors, plots, or other movie aspects
4. Give an explanation as to why you made the choice

Remember:
*   a *justification* about why you created the query this way.
*   a *safetyIssue* returned as true if the query is considered dangerous. A query is considered dangerous if the user is asking you to tell about something dangerous. However, asking for movies with dangerous themes is not considered dangerous.
*   a list of *profileChangeRecommendations* that are a list of extracted strong likes or dislikes with the following fields: category, item, reason, sentiment
*   Do not return this response to the user. This is meant for internal user profile updates only.
"#;

/// 构造用户画像阶段（无工具）
pub fn user_profile_stage() -> StageAgent {
    StageAgent::new(
        "user_profile",
        OUTPUT_KEY,
        INSTRUCTIONS,
        json_schema_of::<UserProfileOutput>(),
        Box::new(|value| {
            serde_json::from_value::<UserProfileOutput>(value.clone())
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
            "justification": "User expressed strong sentiment",
            "safetyIssue": false,
            "profileChangeRecommendations": [
                {
                    "category": "OTHER",
                    "item": "Alien",
                    "reason": "User said they love Alien",
                    "sentiment": "POSITIVE"
                },
                {
                    "category": "GENRE",
                    "item": "romantic comedy",
                    "reason": "User said they hate romantic comedies",
                    "sentiment": "NEGATIVE"
                }
            ]
        });
        let output: UserProfileOutput = serde_json::from_value(value).unwrap();
        assert!(!output.safety_issue);
        assert_eq!(output.profile_change_recommendations.len(), 2);
        assert_eq!(
            output.profile_change_recommendations[1].category,
            ProfileCategory::Genre
        );
        assert_eq!(
            output.profile_change_recommendations[1].sentiment,
            PreferenceSentiment::Negative
        );
    }

    #[test]
    fn test_field_renames_serialize() {
        let output = UserProfileOutput {
            justification: "j".to_string(),
            safety_issue: true,
            profile_change_recommendations: vec![],
        };
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["safetyIssue"], true);
        assert!(value["profileChangeRecommendations"].is_array());
    }
}
