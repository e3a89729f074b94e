//! System prompt assembly

use crate::content::Language;

use super::token_budget::CONTEXT_BLOCK_PREFIX;

/// Separates the base instructions from the retrieved context blocks
pub const CONTEXT_SECTION_MARKER: &str = "\n\n---\nPORTFOLIO CONTEXT:";

/// A project document pulled in because the message named the project
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDocument {
    pub id: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    owner: String,
}

impl PromptBuilder {
    pub fn new(owner: impl Into<String>) -> Self {
        Self { owner: owner.into() }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn base_prompt(&self, language: Language) -> String {
        match language {
            Language::Pt => format!(
                "Você é o assistente virtual do portfólio de {owner}. \
                 Responda em português, de forma clara, cordial e objetiva, sempre com base \
                 nas informações do portfólio fornecidas abaixo. \
                 Se a pergunta não puder ser respondida com esse contexto, diga isso com \
                 honestidade e sugira o contato direto com {owner}. \
                 Não invente projetos, empresas, datas ou tecnologias. \
                 Use markdown simples quando ajudar a leitura.",
                owner = self.owner
            ),
            Language::En => format!(
                "You are the virtual assistant of {owner}'s portfolio. \
                 Answer in English, clearly, politely and concisely, always grounded on the \
                 portfolio information provided below. \
                 If the question cannot be answered from that context, say so honestly and \
                 suggest contacting {owner} directly. \
                 Do not invent projects, companies, dates or technologies. \
                 Use simple markdown when it helps readability.",
                owner = self.owner
            ),
        }
    }

    /// Appends the context section to `base`. Project documents whose content is already
    /// among the retrieved contexts are not repeated. Without any block the base is returned as is.
    pub fn build(base: &str, contexts: &[String], projects: &[ProjectDocument]) -> String {
        let contexts: Vec<&String> = contexts.iter().filter(|c| !c.trim().is_empty()).collect();
        let fresh_projects: Vec<&ProjectDocument> = projects
            .iter()
            .filter(|p| !p.content.trim().is_empty())
            .filter(|p| {
                !contexts
                    .iter()
                    .any(|c| p.content.trim_start().starts_with(c.trim_start()))
            })
            .collect();

        if contexts.is_empty() && fresh_projects.is_empty() {
            return base.to_string();
        }

        let mut prompt = String::from(base);
        prompt.push_str(CONTEXT_SECTION_MARKER);
        for (i, context) in contexts.iter().enumerate() {
            prompt.push_str(&format!("\n\n{}Context {}\n{}", CONTEXT_BLOCK_PREFIX, i + 1, context.trim()));
        }
        for project in fresh_projects {
            prompt.push_str(&format!(
                "\n\n{}Project: {}\n{}",
                CONTEXT_BLOCK_PREFIX,
                project.id,
                project.content.trim()
            ));
        }
        prompt
    }
}
