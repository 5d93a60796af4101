#[derive(Debug, Clone, Copy)]
pub struct TemplateEntry {
    pub id: &'static str,
    pub label: &'static str,
    pub code: &'static str,
}

const API_FLOW: &str = "@startuml
actor User
participant \"Frontend\" as FE
participant \"Backend\" as BE
database \"Database\" as DB

User -> FE: Open App
FE -> BE: GET /api/data
BE -> DB: Query Data
DB -> BE: Return Results
BE -> FE: JSON Response
FE -> User: Display Data
@enduml";

/// Diagram shown on first start, before anything has been persisted.
pub const DEFAULT_SOURCE: &str = API_FLOW;

pub const TEMPLATES: &[TemplateEntry] = &[
    TemplateEntry {
        id: "api-flow",
        label: "API Flow",
        code: API_FLOW,
    },
    TemplateEntry {
        id: "auth",
        label: "Authentication",
        code: "@startuml
actor User
participant \"Client\" as C
participant \"Auth Server\" as AS
participant \"API\" as API

User -> C: Login Request
C -> AS: POST /auth/login
AS -> AS: Validate Credentials
AS -> C: Access Token
C -> API: Request + Token
API -> AS: Validate Token
AS -> API: Token Valid
API -> C: Protected Resource
C -> User: Display Data
@enduml",
    },
    TemplateEntry {
        id: "microservices",
        label: "Microservices",
        code: "@startuml
participant \"API Gateway\" as GW
participant \"User Service\" as US
participant \"Order Service\" as OS
participant \"Payment Service\" as PS
database \"User DB\" as UDB
database \"Order DB\" as ODB

GW -> US: GET /user/123
US -> UDB: Query User
UDB -> US: User Data
US -> GW: User Info

GW -> OS: POST /order
OS -> PS: Process Payment
PS -> OS: Payment Success
OS -> ODB: Save Order
ODB -> OS: Order Saved
OS -> GW: Order Confirmed
@enduml",
    },
    TemplateEntry {
        id: "websocket",
        label: "WebSocket Chat",
        code: "@startuml
actor \"User A\" as UA
actor \"User B\" as UB
participant \"WebSocket Server\" as WS

UA -> WS: Connect
WS -> UA: Connection Established

UB -> WS: Connect
WS -> UB: Connection Established

UA -> WS: Send Message
WS -> UB: Forward Message
UB -> WS: Send Reply
WS -> UA: Forward Reply

UA -> WS: Disconnect
WS -> UA: Connection Closed
@enduml",
    },
    TemplateEntry {
        id: "simple",
        label: "Simple Example",
        code: "@startuml
Alice -> Bob: Hello Bob!
Bob -> Alice: Hi Alice!
Alice -> Bob: How are you?
Bob -> Alice: I'm good, thanks!
@enduml",
    },
];

pub fn select_template(id: &str) -> Option<&'static str> {
    TEMPLATES
        .iter()
        .find(|entry| entry.id == id)
        .map(|entry| entry.code)
}
