use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Prompt Party Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::game::start_game,
        crate::routes::game::get_game,
        crate::routes::round::get_round,
        crate::routes::round::submit_prompt,
        crate::routes::round::cast_vote,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::StartGameRequest,
            crate::dto::game::GameSummary,
            crate::dto::game::PlayerSummary,
            crate::dto::game::RoundBrief,
            crate::dto::round::SubmitPromptRequest,
            crate::dto::round::CastVoteRequest,
            crate::dto::round::PromptReceipt,
            crate::dto::round::VoteReceipt,
            crate::dto::round::RoundSnapshot,
            crate::dto::round::ImageSummary,
            crate::dto::round::VoteTally,
            crate::dto::round::GenerationDiagnostics,
            crate::dto::phase::VisibleRoundStatus,
            crate::dto::phase::VisibleGameStatus,
            crate::dto::sse::Handshake,
            crate::dto::sse::PhaseChangedEvent,
            crate::dto::sse::ImagesReadyEvent,
            crate::dto::sse::ScoreDelta,
            crate::dto::sse::RoundScoredEvent,
            crate::dto::sse::GameEndedEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "game", description = "Game creation and scoreboard"),
        (name = "round", description = "Prompt submission, voting and round snapshots"),
    )
)]
pub struct ApiDoc;
