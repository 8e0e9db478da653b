use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, to_bson, Bson, DateTime as BsonDateTime, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument},
    Client as MongoClient, ClientSession, Collection, Database, IndexModel,
};

use super::{AuthStore, StoreError, TenantTransaction};
use crate::models::{
    Department, Organization, RefreshToken, Role, TokenKind, TokenScope, User, UserUpdate,
};

const USERS: &str = "users";
const ORGANIZATIONS: &str = "organizations";
const ROLES: &str = "roles";
const DEPARTMENTS: &str = "departments";
const REFRESH_TOKENS: &str = "refresh_tokens";

/// MongoDB-backed store. Tenant registration uses multi-document
/// transactions, so the deployment must be a replica set.
#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, StoreError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            StoreError::Database(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), StoreError> {
        tracing::info!("Creating MongoDB indexes for tenant-auth");

        create_index(&self.users(), doc! { "email": 1 }, "email_idx", true).await?;
        create_index(&self.users(), doc! { "phone": 1 }, "phone_idx", false).await?;
        create_index(&self.users(), doc! { "organization_id": 1 }, "organization_id_idx", false)
            .await?;
        for kind in [
            TokenKind::MagicLink,
            TokenKind::PhoneVerification,
            TokenKind::EmailVerification,
            TokenKind::PasswordReset,
        ] {
            let field = format!("{}.hash", kind.field());
            let mut keys = Document::new();
            keys.insert(field.clone(), 1);
            create_index(&self.users(), keys, &format!("{}_idx", field.replace('.', "_")), false)
                .await?;
        }

        create_index(&self.organizations(), doc! { "email": 1 }, "email_idx", true).await?;
        create_index(
            &self.organizations(),
            doc! { "organization_code": 1 },
            "organization_code_idx",
            true,
        )
        .await?;

        create_index(
            &self.roles(),
            doc! { "organization_id": 1, "name": 1 },
            "organization_name_idx",
            true,
        )
        .await?;
        create_index(&self.departments(), doc! { "organization_id": 1 }, "organization_id_idx", false)
            .await?;
        create_index(&self.refresh_tokens(), doc! { "user_id": 1 }, "user_id_idx", false).await?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn organizations(&self) -> Collection<Organization> {
        self.db.collection(ORGANIZATIONS)
    }

    fn roles(&self) -> Collection<Role> {
        self.db.collection(ROLES)
    }

    fn departments(&self) -> Collection<Department> {
        self.db.collection(DEPARTMENTS)
    }

    fn refresh_tokens(&self) -> Collection<RefreshToken> {
        self.db.collection(REFRESH_TOKENS)
    }
}

async fn create_index<T: Send + Sync>(
    collection: &Collection<T>,
    keys: Document,
    name: &str,
    unique: bool,
) -> Result<(), StoreError> {
    let index = IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(name.to_string())
                .unique(unique)
                .build(),
        )
        .build();

    collection.create_index(index, None).await.map_err(|e| {
        tracing::error!(collection = %collection.name(), index = %name, "Failed to create index: {}", e);
        StoreError::Database(e)
    })?;
    Ok(())
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == 11000,
        ErrorKind::Command(e) => e.code == 11000,
        _ => false,
    }
}

fn insert_error(entity: &'static str) -> impl FnOnce(mongodb::error::Error) -> StoreError {
    move |e| {
        if is_duplicate_key(&e) {
            StoreError::Duplicate(entity)
        } else {
            StoreError::Database(e)
        }
    }
}

fn token_filter(
    kind: TokenKind,
    scope: TokenScope<'_>,
    hash: &str,
    now: DateTime<Utc>,
) -> Document {
    let field = kind.field();
    let mut filter = Document::new();
    filter.insert(format!("{field}.hash"), hash);
    filter.insert(
        format!("{field}.expires_at"),
        doc! { "$gt": BsonDateTime::from_chrono(now) },
    );
    match scope {
        TokenScope::Any => {}
        TokenScope::User(id) => {
            filter.insert("_id", id);
        }
        TokenScope::Email(email) => {
            filter.insert("email", email);
        }
        TokenScope::Phone(phone) => {
            filter.insert("phone", phone);
        }
    }
    filter
}

/// `$set` (and `$push` for a remembered device) covering only the fields
/// `update` names.
fn user_update_document(update: &UserUpdate, now: DateTime<Utc>) -> Result<Document, StoreError> {
    let now = to_bson(&now)?;
    let mut set = Document::new();
    let mut push = None;

    match update {
        UserUpdate::SignIn {
            phone_verified,
            trusted_device,
        } => {
            set.insert("login_attempts", 0_i32);
            set.insert("lockout_until", Bson::Null);
            set.insert("last_login", now.clone());
            set.insert("last_login_at", now.clone());
            if *phone_verified {
                set.insert("phone_verified", true);
            }
            if let Some(device) = trusted_device {
                push = Some(doc! { "trusted_devices": to_bson(device)? });
            }
        }
        UserUpdate::IssueToken { kind, token } => {
            set.insert(kind.field(), to_bson(token)?);
        }
        UserUpdate::MfaSecret(secret) => {
            set.insert("two_factor_secret", secret.as_str());
        }
        UserUpdate::EnableMfa => {
            set.insert("two_factor_enabled", true);
        }
        UserUpdate::DisableMfa => {
            set.insert("two_factor_enabled", false);
            set.insert("two_factor_secret", Bson::Null);
            set.insert("trusted_devices", Bson::Array(Vec::new()));
        }
        UserUpdate::EmailVerified => {
            set.insert("email_verified", true);
        }
        UserUpdate::PhoneVerified => {
            set.insert("phone_verified", true);
        }
        UserUpdate::Password {
            hash,
            clear_lockout,
        } => {
            set.insert("password_hash", hash.as_str());
            if *clear_lockout {
                set.insert("login_attempts", 0_i32);
                set.insert("lockout_until", Bson::Null);
            }
        }
        UserUpdate::Profile(fields) => {
            set.insert("full_name", fields.full_name.as_str());
            set.insert("email", fields.email.as_str());
            set.insert("email_verified", fields.email_verified);
            set.insert("phone", to_bson(&fields.phone)?);
            set.insert("phone_verified", fields.phone_verified);
            set.insert("bio", to_bson(&fields.bio)?);
            set.insert("avatar", to_bson(&fields.avatar)?);
        }
    }
    set.insert("updated_at", now);

    let mut document = doc! { "$set": set };
    if let Some(push) = push {
        document.insert("$push", push);
    }
    Ok(document)
}

fn return_updated() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

#[async_trait]
impl AuthStore for MongoStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                StoreError::Database(e)
            })?;
        Ok(())
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users().find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users().find_one(doc! { "email": email }, None).await?)
    }

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users().find_one(doc! { "phone": phone }, None).await?)
    }

    async fn apply_user_update(
        &self,
        user_id: &str,
        update: &UserUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        self.users()
            .find_one_and_update(
                doc! { "_id": user_id },
                user_update_document(update, now)?,
                return_updated(),
            )
            .await
            .map_err(insert_error("user"))
    }

    async fn contact_taken(
        &self,
        email: &str,
        phone: Option<&str>,
        exclude_user_id: &str,
    ) -> Result<bool, StoreError> {
        let mut contacts = vec![doc! { "email": email }];
        if let Some(phone) = phone {
            contacts.push(doc! { "phone": phone });
        }
        let count = self
            .users()
            .count_documents(
                doc! { "_id": { "$ne": exclude_user_id }, "$or": contacts },
                None,
            )
            .await?;
        Ok(count > 0)
    }

    async fn record_failed_login(
        &self,
        user_id: &str,
        threshold: u32,
        lockout_until: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let threshold = i64::from(threshold);
        let lockout_until = to_bson(&lockout_until)?;
        let now = to_bson(&Utc::now())?;

        // Pipeline update: the increment and the threshold check see the same document.
        let update = vec![
            doc! { "$set": {
                "login_attempts": { "$add": [{ "$ifNull": ["$login_attempts", 0] }, 1] },
                "updated_at": now,
            } },
            doc! { "$set": {
                "lockout_until": {
                    "$cond": [
                        { "$gte": ["$login_attempts", threshold] },
                        lockout_until,
                        { "$ifNull": ["$lockout_until", Bson::Null] },
                    ]
                },
            } },
        ];

        Ok(self
            .users()
            .find_one_and_update(doc! { "_id": user_id }, update, return_updated())
            .await?)
    }

    async fn consume_token(
        &self,
        kind: TokenKind,
        scope: TokenScope<'_>,
        hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let mut clear = Document::new();
        clear.insert(kind.field(), Bson::Null);
        clear.insert("updated_at", to_bson(&now)?);

        Ok(self
            .users()
            .find_one_and_update(
                token_filter(kind, scope, hash, now),
                doc! { "$set": clear },
                return_updated(),
            )
            .await?)
    }

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError> {
        self.refresh_tokens()
            .insert_one(token, None)
            .await
            .map_err(insert_error("refresh token"))?;
        Ok(())
    }

    async fn find_refresh_token(&self, id: &str) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.refresh_tokens().find_one(doc! { "_id": id }, None).await?)
    }

    async fn revoke_refresh_token(&self, id: &str) -> Result<bool, StoreError> {
        let result = self
            .refresh_tokens()
            .update_one(
                doc! { "_id": id, "revoked": false },
                doc! { "$set": { "revoked": true } },
                None,
            )
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn revoke_user_refresh_tokens(&self, user_id: &str) -> Result<u64, StoreError> {
        let result = self
            .refresh_tokens()
            .update_many(
                doc! { "user_id": user_id, "revoked": false },
                doc! { "$set": { "revoked": true } },
                None,
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn find_organization(&self, id: &str) -> Result<Option<Organization>, StoreError> {
        Ok(self.organizations().find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_role(
        &self,
        organization_id: &str,
        name: &str,
    ) -> Result<Option<Role>, StoreError> {
        Ok(self
            .roles()
            .find_one(doc! { "organization_id": organization_id, "name": name }, None)
            .await?)
    }

    async fn begin_tenant_transaction(&self) -> Result<Box<dyn TenantTransaction>, StoreError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        Ok(Box::new(MongoTenantTransaction {
            store: self.clone(),
            session,
        }))
    }
}

/// Session-bound writes. Dropping the session without committing aborts
/// the transaction on the server.
struct MongoTenantTransaction {
    store: MongoStore,
    session: ClientSession,
}

#[async_trait]
impl TenantTransaction for MongoTenantTransaction {
    async fn organization_email_taken(&mut self, email: &str) -> Result<bool, StoreError> {
        let count = self
            .store
            .organizations()
            .count_documents_with_session(doc! { "email": email }, None, &mut self.session)
            .await?;
        Ok(count > 0)
    }

    async fn user_email_taken(&mut self, email: &str) -> Result<bool, StoreError> {
        let count = self
            .store
            .users()
            .count_documents_with_session(doc! { "email": email }, None, &mut self.session)
            .await?;
        Ok(count > 0)
    }

    async fn insert_organization(&mut self, organization: &Organization) -> Result<(), StoreError> {
        self.store
            .organizations()
            .insert_one_with_session(organization, None, &mut self.session)
            .await
            .map_err(insert_error("organization"))?;
        Ok(())
    }

    async fn insert_role(&mut self, role: &Role) -> Result<(), StoreError> {
        self.store
            .roles()
            .insert_one_with_session(role, None, &mut self.session)
            .await
            .map_err(insert_error("role"))?;
        Ok(())
    }

    async fn insert_department(&mut self, department: &Department) -> Result<(), StoreError> {
        self.store
            .departments()
            .insert_one_with_session(department, None, &mut self.session)
            .await
            .map_err(insert_error("department"))?;
        Ok(())
    }

    async fn insert_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.store
            .users()
            .insert_one_with_session(user, None, &mut self.session)
            .await
            .map_err(insert_error("user"))?;
        Ok(())
    }

    async fn set_department_creator(
        &mut self,
        department_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        let result = self
            .store
            .departments()
            .update_one_with_session(
                doc! { "_id": department_id },
                doc! { "$set": { "created_by": user_id } },
                None,
                &mut self.session,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::Backend(format!("Department {department_id} not found")));
        }
        Ok(())
    }

    async fn set_organization_owner(
        &mut self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        let result = self
            .store
            .organizations()
            .update_one_with_session(
                doc! { "_id": organization_id },
                doc! { "$set": { "owner": user_id } },
                None,
                &mut self.session,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::Backend(format!(
                "Organization {organization_id} not found"
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        this.session.commit_transaction().await.map_err(|e| {
            if is_duplicate_key(&e) {
                StoreError::Duplicate("organization")
            } else {
                StoreError::Database(e)
            }
        })
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        Ok(this.session.abort_transaction().await?)
    }
}
