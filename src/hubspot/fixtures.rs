//! Static seed data served when HubSpot is unconfigured or unreachable.
//!
//! Never merged with live data.

use crate::types::{Contact, Note};

struct ContactSeed {
    id: &'static str,
    first_name: &'static str,
    last_name: &'static str,
    email: &'static str,
    phone: &'static str,
    company: &'static str,
    created_at: &'static str,
    last_modified: &'static str,
}

struct NoteSeed {
    id: &'static str,
    contact_id: &'static str,
    text: &'static str,
    created_at: &'static str,
    created_by: &'static str,
}

static CONTACTS: &[ContactSeed] = &[
    ContactSeed {
        id: "1",
        first_name: "Max",
        last_name: "Mustermann",
        email: "max.mustermann@example.com",
        phone: "+49 123 45678900",
        company: "Muster GmbH",
        created_at: "2023-01-15T10:30:00Z",
        last_modified: "2023-03-20T14:45:00Z",
    },
    ContactSeed {
        id: "2",
        first_name: "Anna",
        last_name: "Schmidt",
        email: "anna.schmidt@example.com",
        phone: "+49 123 45678901",
        company: "Schmidt AG",
        created_at: "2023-02-10T09:15:00Z",
        last_modified: "2023-03-18T11:20:00Z",
    },
    ContactSeed {
        id: "3",
        first_name: "Thomas",
        last_name: "Weber",
        email: "thomas.weber@example.com",
        phone: "",
        company: "",
        created_at: "2023-03-05T13:45:00Z",
        last_modified: "2023-03-15T16:30:00Z",
    },
];

static NOTES: &[NoteSeed] = &[
    NoteSeed {
        id: "101",
        contact_id: "1",
        text: "Interested in our premium package. Follow up in one week.",
        created_at: "2023-03-10T10:30:00Z",
        created_by: "Sabine Müller",
    },
    NoteSeed {
        id: "102",
        contact_id: "1",
        text: "Asked about discounts. Needs an individual quote.",
        created_at: "2023-03-20T14:45:00Z",
        created_by: "Michael Klein",
    },
    NoteSeed {
        id: "103",
        contact_id: "2",
        text: "Wants more information about our enterprise offering.",
        created_at: "2023-03-18T11:20:00Z",
        created_by: "Sabine Müller",
    },
];

impl ContactSeed {
    fn to_contact(&self) -> Contact {
        Contact {
            id: self.id.to_string(),
            first_name: self.first_name.to_string(),
            last_name: self.last_name.to_string(),
            email: self.email.to_string(),
            phone: self.phone.to_string(),
            company: self.company.to_string(),
            created_at: self.created_at.to_string(),
            last_modified: self.last_modified.to_string(),
        }
    }
}

impl NoteSeed {
    fn to_note(&self) -> Note {
        Note {
            id: self.id.to_string(),
            contact_id: self.contact_id.to_string(),
            text: self.text.to_string(),
            created_at: self.created_at.to_string(),
            created_by: self.created_by.to_string(),
        }
    }
}

pub fn contacts() -> Vec<Contact> {
    CONTACTS.iter().map(ContactSeed::to_contact).collect()
}

pub fn contact(id: &str) -> Option<Contact> {
    CONTACTS
        .iter()
        .find(|c| c.id == id)
        .map(ContactSeed::to_contact)
}

/// Seeded notes for one contact, in seed order.
pub fn notes_for_contact(contact_id: &str) -> Vec<Note> {
    NOTES
        .iter()
        .filter(|n| n.contact_id == contact_id)
        .map(NoteSeed::to_note)
        .collect()
}
