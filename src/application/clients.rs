use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Value, json};

use crate::application::context::DataContext;
use crate::application::error::DataError;
use crate::application::mapping::{map_client, map_clients};
use crate::application::mutation::{Mutation, MutationOp, Outcome};
use crate::application::repos::{ListQuery, RawRecord, RecordStore};
use crate::cache::{CacheKey, Fetcher, QueryHandle};
use crate::domain::entities::{Client, RecordId};
use crate::domain::types::Table;

const TABLE: Table = Table::Clients;

/// Input for `add_client`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClient {
    name: String,
    email: String,
    phone: String,
    notes: Option<String>,
}

impl NewClient {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
        notes: Option<String>,
    ) -> Result<Self, DataError> {
        Ok(Self {
            name: required("name", name.into())?,
            email: required("email", email.into())?,
            phone: required("phone", phone.into())?,
            notes: notes.filter(|notes| !notes.trim().is_empty()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Row for insertion; a missing note is omitted so the backend default
    /// applies.
    fn insert_record(&self) -> RawRecord {
        let mut record = RawRecord::new();
        record.insert("name".into(), json!(self.name));
        record.insert("email".into(), json!(self.email));
        record.insert("phone".into(), json!(self.phone));
        if let Some(notes) = &self.notes {
            record.insert("notes".into(), json!(notes));
        }
        record
    }

    /// Full replacement of the editable columns; a missing note clears it.
    fn update_record(&self) -> RawRecord {
        let mut record = self.insert_record();
        record.entry("notes").or_insert(Value::Null);
        record
    }
}

/// Input for `update_client`: the target id plus every editable field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientUpdate {
    id: RecordId,
    fields: NewClient,
}

impl ClientUpdate {
    pub fn new(id: &str, fields: NewClient) -> Result<Self, DataError> {
        Ok(Self {
            id: id.parse()?,
            fields,
        })
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn fields(&self) -> &NewClient {
        &self.fields
    }
}

/// Input for `delete_client`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientId(RecordId);

impl ClientId {
    pub fn new(id: &str) -> Result<Self, DataError> {
        Ok(Self(id.parse()?))
    }

    pub fn get(self) -> RecordId {
        self.0
    }
}

fn required(field: &str, value: String) -> Result<String, DataError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DataError::Validation(format!("client {field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn list_query() -> ListQuery {
    ListQuery::new().order_by("created_at", false)
}

/// Backend read behind the `clients` cache key: newest first.
pub(crate) fn fetcher(store: Arc<dyn RecordStore>) -> Fetcher<Vec<Client>> {
    Arc::new(move || {
        let store = Arc::clone(&store);
        async move {
            let rows = store
                .list(TABLE, &list_query())
                .await
                .map_err(|err| DataError::from_store(TABLE, None, err))?;
            map_clients(rows)
        }
        .boxed()
    })
}

pub struct AddClient;

#[async_trait]
impl MutationOp for AddClient {
    type Payload = NewClient;
    type Output = Client;

    const NAME: &'static str = "add_client";
    const KEY: CacheKey = CacheKey::Clients;
    const OUTCOME: Outcome = Outcome {
        success_title: "Cliente agregado",
        success_description: "El cliente se ha registrado exitosamente.",
        failure_description: "No se pudo agregar el cliente. Inténtalo de nuevo.",
    };

    async fn execute(
        &self,
        store: &dyn RecordStore,
        payload: NewClient,
    ) -> Result<Client, DataError> {
        let row = store
            .insert(TABLE, payload.insert_record())
            .await
            .map_err(|err| DataError::from_store(TABLE, None, err))?;
        map_client(&row)
    }
}

pub struct UpdateClient;

#[async_trait]
impl MutationOp for UpdateClient {
    type Payload = ClientUpdate;
    type Output = Client;

    const NAME: &'static str = "update_client";
    const KEY: CacheKey = CacheKey::Clients;
    const OUTCOME: Outcome = Outcome {
        success_title: "Cliente actualizado",
        success_description: "Los datos del cliente se han actualizado exitosamente.",
        failure_description: "No se pudo actualizar el cliente. Inténtalo de nuevo.",
    };

    async fn execute(
        &self,
        store: &dyn RecordStore,
        payload: ClientUpdate,
    ) -> Result<Client, DataError> {
        let row = store
            .update(TABLE, payload.id, payload.fields.update_record())
            .await
            .map_err(|err| DataError::from_store(TABLE, Some(payload.id), err))?;
        map_client(&row)
    }
}

pub struct DeleteClient;

#[async_trait]
impl MutationOp for DeleteClient {
    type Payload = ClientId;
    type Output = ();

    const NAME: &'static str = "delete_client";
    const KEY: CacheKey = CacheKey::Clients;
    const OUTCOME: Outcome = Outcome {
        success_title: "Cliente eliminado",
        success_description: "El cliente se ha eliminado exitosamente.",
        failure_description: "No se pudo eliminar el cliente. Inténtalo de nuevo.",
    };

    async fn execute(&self, store: &dyn RecordStore, payload: ClientId) -> Result<(), DataError> {
        store
            .delete(TABLE, payload.get())
            .await
            .map_err(|err| DataError::from_store(TABLE, Some(payload.get()), err))
    }
}

/// Client collection and its write operations.
#[derive(Clone)]
pub struct ClientService {
    context: DataContext,
}

impl ClientService {
    pub fn new(context: DataContext) -> Self {
        Self { context }
    }

    /// Subscribe to the `clients` key.
    pub fn clients(&self) -> QueryHandle<Vec<Client>> {
        QueryHandle::new(self.context.cache().clients().clone())
    }

    pub async fn list(&self) -> Result<Arc<Vec<Client>>, DataError> {
        self.context.cache().clients().get().await
    }

    pub fn add_client(&self) -> Mutation<AddClient> {
        Mutation::new(AddClient, self.context.clone())
    }

    pub fn update_client(&self) -> Mutation<UpdateClient> {
        Mutation::new(UpdateClient, self.context.clone())
    }

    pub fn delete_client(&self) -> Mutation<DeleteClient> {
        Mutation::new(DeleteClient, self.context.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_client_trims_and_requires_contact_fields() {
        let client = NewClient::new(" Ana ", "ana@example.com", "12345678", Some("  ".into()))
            .expect("valid");
        assert_eq!(client.name(), "Ana");
        assert_eq!(client.notes(), None);

        for (name, email, phone) in [("", "a@b.c", "1"), ("Ana", " ", "1"), ("Ana", "a@b.c", "")] {
            let error = NewClient::new(name, email, phone, None).expect_err("empty field");
            assert_eq!(error.kind(), "validation");
        }
    }

    #[test]
    fn update_record_clears_missing_notes() {
        let fields = NewClient::new("Ana", "ana@example.com", "12345678", None).expect("valid");
        assert!(!fields.insert_record().contains_key("notes"));
        assert_eq!(fields.update_record().get("notes"), Some(&Value::Null));
    }

    #[test]
    fn ids_must_be_numeric() {
        let fields = NewClient::new("Ana", "ana@example.com", "12345678", None).expect("valid");
        assert!(ClientUpdate::new("abc", fields).is_err());
        assert!(ClientId::new("").is_err());
        assert_eq!(ClientId::new("8").expect("numeric").get(), RecordId::new(8));
    }
}
