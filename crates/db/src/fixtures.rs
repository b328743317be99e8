use towline_core::domain::client::{Client, ClientId, RateCard};

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlClientRepository};

/// Client catalogue a fresh installation starts with. Every entry belongs to company 1 and
/// carries an all-zero rate card until real rates are negotiated.
pub const DEMO_CLIENTS: &[DemoClient] = &[
    DemoClient { id: "particular", name: "Particular" },
    DemoClient { id: "ike-asistencia", name: "IKE asistencia" },
    DemoClient { id: "mas-servicios", name: "MAS servicios" },
    DemoClient { id: "mawdi", name: "MAWDI" },
    DemoClient { id: "telasist", name: "Telasist" },
    DemoClient { id: "adiuva", name: "ADIUVA" },
    DemoClient { id: "inbursa", name: "Inbursa" },
    DemoClient { id: "ford", name: "Ford" },
    DemoClient { id: "spv", name: "SPV" },
];

pub const DEMO_COMPANY_ID: i64 = 1;

/// Fleet names offered as suggestions when assigning a unit.
pub const DEMO_UNITS: &[&str] =
    &["Grúa 01 - Plataforma", "Grúa 02 - Arrastre", "Grúa 03 - Pesada", "Grúa 04 - Pluma"];

pub const DEMO_OPERATORS: &[&str] = &["Juan Pérez", "Roberto Gómez", "Carlos Ruiz", "Miguel Ángel"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DemoClient {
    pub id: &'static str,
    pub name: &'static str,
}

impl DemoClient {
    pub fn to_client(&self) -> Client {
        Client {
            id: ClientId(self.id.to_string()),
            name: self.name.to_string(),
            company_id: Some(DEMO_COMPANY_ID),
            rate_card: Some(RateCard::default()),
        }
    }
}

pub struct DemoDataset;

impl DemoDataset {
    /// Seeds the default client catalogue. Clients that already exist keep their rate cards.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let repository = SqlClientRepository::new(pool.clone());
        let mut clients_seeded = Vec::new();
        let mut clients_kept = Vec::new();

        for demo in DEMO_CLIENTS {
            let id = ClientId(demo.id.to_string());
            if repository.find(&id).await?.is_some() {
                clients_kept.push(demo.id);
                continue;
            }
            repository.save(&demo.to_client()).await?;
            clients_seeded.push(demo.id);
        }

        Ok(SeedResult { clients_seeded, clients_kept })
    }

    /// Checks that every catalogue client is present under its expected name.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let repository = SqlClientRepository::new(pool.clone());
        let mut checks = Vec::with_capacity(DEMO_CLIENTS.len());

        for demo in DEMO_CLIENTS {
            let stored = repository.find(&ClientId(demo.id.to_string())).await?;
            let present = stored.map(|client| client.name == demo.name).unwrap_or(false);
            checks.push((demo.id, present));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub clients_seeded: Vec<&'static str>,
    pub clients_kept: Vec<&'static str>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

impl VerificationResult {
    pub fn missing(&self) -> Vec<&'static str> {
        self.checks.iter().filter(|(_, present)| !*present).map(|(id, _)| *id).collect()
    }
}
