//! The five terminal screens, driven as a state machine over stdin lines.

use std::io::Write as _;
use std::sync::Arc;

use anyhow::Result;
use client_core::{SessionController, SessionEvent};
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::broadcast::error::RecvError,
};
use tracing::warn;

use crate::events::{describe, requires_reauth};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    SignIn,
    SignUp,
    Account,
    Composer,
    Posts,
    Quit,
}

pub struct ScreenLoop {
    controller: Arc<SessionController>,
    input: Lines<BufReader<Stdin>>,
}

impl ScreenLoop {
    pub fn new(controller: Arc<SessionController>) -> Self {
        Self {
            controller,
            input: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    pub async fn run(&mut self, initial: Screen) -> Result<()> {
        let mut screen = initial;
        loop {
            screen = match screen {
                Screen::SignIn => self.sign_in_screen().await?,
                Screen::SignUp => self.sign_up_screen().await?,
                Screen::Account => self.account_screen().await?,
                Screen::Composer => self.composer_screen().await?,
                Screen::Posts => self.posts_screen().await?,
                Screen::Quit => return Ok(()),
            };
        }
    }

    async fn prompt(&mut self, label: &str) -> Result<Option<String>> {
        print!("{label}: ");
        std::io::stdout().flush()?;
        Ok(self
            .input
            .next_line()
            .await?
            .map(|line| line.trim().to_string()))
    }

    async fn sign_in_screen(&mut self) -> Result<Screen> {
        println!();
        println!("== Sign in ==  (\"new\" switches to account creation, \"quit\" exits)");
        let Some(choice) = self.prompt("email (or new/quit)").await? else {
            return Ok(Screen::Quit);
        };
        match choice.as_str() {
            "quit" => return Ok(Screen::Quit),
            "new" => return Ok(Screen::SignUp),
            "" => {
                println!("email must not be empty");
                return Ok(Screen::SignIn);
            }
            _ => {}
        }
        let Some(password) = self.prompt("password").await? else {
            return Ok(Screen::Quit);
        };
        if password.is_empty() {
            println!("password must not be empty");
            return Ok(Screen::SignIn);
        }

        match self.controller.sign_in(&choice, &password).await {
            Ok(user_id) => {
                println!("signed in as {user_id}");
                Ok(Screen::Account)
            }
            Err(err) => {
                println!("{}", describe(&err));
                Ok(Screen::SignIn)
            }
        }
    }

    async fn sign_up_screen(&mut self) -> Result<Screen> {
        println!();
        println!("== Create account ==  (\"back\" returns to sign-in)");
        let Some(email) = self.prompt("email (or back)").await? else {
            return Ok(Screen::Quit);
        };
        match email.as_str() {
            "back" => return Ok(Screen::SignIn),
            "" => {
                println!("email must not be empty");
                return Ok(Screen::SignUp);
            }
            _ => {}
        }
        let Some(password) = self.prompt("password").await? else {
            return Ok(Screen::Quit);
        };
        if password.is_empty() {
            println!("password must not be empty");
            return Ok(Screen::SignUp);
        }

        match self.controller.sign_up(&email, &password).await {
            Ok(user_id) => {
                println!("account created, signed in as {user_id}");
                Ok(Screen::Account)
            }
            Err(err) => {
                println!("{}", describe(&err));
                Ok(Screen::SignUp)
            }
        }
    }

    async fn account_screen(&mut self) -> Result<Screen> {
        println!();
        println!("== Account ==");
        let Some(choice) = self.prompt("p) posts  c) compose  o) sign out  q) quit").await?
        else {
            return Ok(Screen::Quit);
        };
        match choice.as_str() {
            "p" => Ok(Screen::Posts),
            "c" => Ok(Screen::Composer),
            "o" => {
                self.controller.sign_out().await;
                Ok(Screen::SignIn)
            }
            "q" => Ok(Screen::Quit),
            _ => Ok(Screen::Account),
        }
    }

    async fn composer_screen(&mut self) -> Result<Screen> {
        println!();
        println!("== New post ==  (empty line cancels)");
        let Some(text) = self.prompt("post").await? else {
            return Ok(Screen::Quit);
        };
        if text.is_empty() {
            return Ok(Screen::Account);
        }

        match self.controller.create_post(&text).await {
            Ok(key) => {
                println!("posted ({key})");
                Ok(Screen::Account)
            }
            Err(err) => {
                println!("{}", describe(&err));
                if requires_reauth(&err) {
                    Ok(Screen::SignIn)
                } else {
                    Ok(Screen::Account)
                }
            }
        }
    }

    async fn posts_screen(&mut self) -> Result<Screen> {
        if let Err(err) = self.controller.watch_posts().await {
            println!("{}", describe(&err));
            return Ok(if requires_reauth(&err) {
                Screen::SignIn
            } else {
                Screen::Account
            });
        }

        let mut events = self.controller.subscribe_events();
        println!();
        println!("== Posts ==  (live; press Enter to go back)");
        for post in self.controller.posts().await {
            println!("  {post}");
        }

        loop {
            tokio::select! {
                line = self.input.next_line() => {
                    if line?.is_none() {
                        return Ok(Screen::Quit);
                    }
                    return Ok(Screen::Account);
                }
                event = events.recv() => match event {
                    Ok(SessionEvent::PostAdded { value }) => println!("  {value}"),
                    Ok(SessionEvent::SignedOut) => return Ok(Screen::SignIn),
                    Ok(SessionEvent::Error(message)) => println!("  ! {message}"),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "posts screen lagged behind session events");
                    }
                    Err(RecvError::Closed) => return Ok(Screen::Account),
                },
            }
        }
    }
}
